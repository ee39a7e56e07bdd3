// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! File-backed segment writer/reader, for [`crate::config::StorageKind::File`]
//! caches. Adapted from the teacher's `segment::writer`/`segment::reader`:
//! a single append-only writer while the segment is open, reopened as an
//! independent reader (so scans don't contend with writes) once sealed.

use super::item::Item;
use crate::coding::Decode;
use crate::id::SegmentId;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// The write side of a file-backed segment.
pub struct FileSegmentWriter {
    path: PathBuf,
    inner: Mutex<BufWriter<File>>,
    offset: std::sync::atomic::AtomicU64,
}

impl FileSegmentWriter {
    /// Creates (truncating) the segment file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;

        Ok(Self {
            path,
            inner: Mutex::new(BufWriter::new(file)),
            offset: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Appends `item`, returning its offset in the segment.
    pub fn append(&self, item: &Item) -> crate::Result<u64> {
        let mut inner = self.inner.lock();
        let offset = self.offset.load(std::sync::atomic::Ordering::Relaxed);
        let written = item.encode_into(&mut *inner).map_err(crate::Error::Encode)?;
        self.offset
            .fetch_add(written, std::sync::atomic::Ordering::Relaxed);
        Ok(offset)
    }

    /// Current write offset (also the segment's current byte length).
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Flushes and `fsync`s the segment file. Called when sealing.
    pub fn sync(&self) -> crate::Result<()> {
        let mut inner = self.inner.lock();
        inner.flush()?;
        inner.get_mut().sync_all()?;
        Ok(())
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read-only view of a sealed, file-backed segment. Opens its own file
/// handle independent of any [`FileSegmentWriter`] so concurrent scans
/// (recovery, scavenger) never block on the writer's lock.
pub struct FileSegmentReader {
    path: PathBuf,
}

impl FileSegmentReader {
    /// Wraps the segment file at `path` for positioned reads and scans.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the item at `offset`.
    pub fn read_at(&self, segment_id: SegmentId, offset: u64) -> crate::Result<Item> {
        let file = File::open(&self.path).map_err(|e| {
            crate::Error::Unrecoverable(format!(
                "segment {segment_id} missing at {}: {e}",
                self.path.display()
            ))
        })?;
        let mut reader = BufReader::new(file);
        reader.seek(std::io::SeekFrom::Start(offset))?;
        Item::decode_from(&mut reader).map_err(crate::Error::Decode)
    }

    /// Iterates every item in the segment, up to `len` bytes (the trailer,
    /// if present, lives past `len`).
    pub fn iter(&self, len: u64) -> crate::Result<FileSegmentIter> {
        let file = File::open(&self.path)?;
        Ok(FileSegmentIter {
            inner: BufReader::new(file),
            offset: 0,
            len,
        })
    }
}

/// Iterator over a file segment's items.
pub struct FileSegmentIter {
    inner: BufReader<File>,
    offset: u64,
    len: u64,
}

impl Iterator for FileSegmentIter {
    type Item = crate::Result<(Item, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.len {
            return None;
        }

        let start = self.offset;
        match Item::decode_from(&mut self.inner) {
            Ok(item) => {
                // Re-derive bytes consumed from stream position rather than
                // trusting `item.encoded_len()`, which would mask a reader
                // desync.
                let pos = self.inner.stream_position().unwrap_or(start + item.encoded_len());
                self.offset = pos;
                Some(Ok((item, start)))
            }
            Err(e) => {
                self.offset = self.len;
                Some(Err(crate::Error::Decode(e)))
            }
        }
    }
}
