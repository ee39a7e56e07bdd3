// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Prefetch Buffer: a sequential reader over a file-backed segment with a
//! configurable read-ahead window (`file.prefetch.buffer.size`), used by
//! the Scavenger's full-segment scans so a victim segment is read in large
//! chunks rather than one small `pread` per item.
//!
//! Open Question (resolved): an item that straddles the end of the
//! buffered window simply triggers another fill from the underlying file —
//! [`std::io::BufReader`] already does this transparently, so there is no
//! special "small trailing KV" case to handle here; a genuinely truncated
//! final item (fewer bytes on disk than its header claims) surfaces as an
//! `UnexpectedEof` I/O error, which the Scavenger treats the same as any
//! other decode failure on a victim segment: log and skip the remainder.

use super::item::Item;
use crate::coding::Decode;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Default read-ahead window when a cache doesn't override
/// `file.prefetch.buffer.size`.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Sequential, read-ahead scanner over one file-backed segment.
pub struct PrefetchBuffer {
    inner: BufReader<File>,
    offset: u64,
    len: u64,
}

impl PrefetchBuffer {
    /// Opens `path` for sequential scanning with the given read-ahead
    /// window, stopping after `len` bytes (the segment's payload size,
    /// excluding its trailer).
    pub fn open(path: impl AsRef<Path>, len: u64, buffer_size: usize) -> crate::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            inner: BufReader::with_capacity(buffer_size.max(4096), file),
            offset: 0,
            len,
        })
    }

    /// Seeks to `offset` before resuming sequential reads; used to resume a
    /// paused scan (e.g. after the Scavenger's stall-control backs off).
    pub fn seek_to(&mut self, offset: u64) -> crate::Result<()> {
        self.inner.seek(std::io::SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next item, or `None` once the window `[0, len)` is exhausted.
    pub fn read_item(&mut self) -> crate::Result<Option<(Item, u64)>> {
        if self.offset >= self.len {
            return Ok(None);
        }

        let start = self.offset;
        let item = Item::decode_from(&mut self.inner).map_err(crate::Error::Decode)?;
        self.offset = self
            .inner
            .stream_position()
            .map_err(crate::Error::Io)?;
        Ok(Some((item, start)))
    }

    /// Current read offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::file::FileSegmentWriter;
    use crate::Slice;

    fn item(k: &str, v: &str) -> Item {
        Item {
            key: Slice::from(k),
            value: Slice::from(v),
            expire: 0,
        }
    }

    #[test]
    fn reads_every_item_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.dat");

        let writer = FileSegmentWriter::create(&path).unwrap();
        writer.append(&item("a", "1")).unwrap();
        writer.append(&item("b", "2")).unwrap();
        let len = writer.offset();
        writer.sync().unwrap();

        let mut prefetch = PrefetchBuffer::open(&path, len, 16).unwrap();
        let mut seen = vec![];
        while let Some((it, _off)) = prefetch.read_item().unwrap() {
            seen.push(it);
        }
        assert_eq!(seen, vec![item("a", "1"), item("b", "2")]);
    }

    #[test]
    fn small_buffer_smaller_than_one_item_still_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.dat");

        let writer = FileSegmentWriter::create(&path).unwrap();
        writer.append(&item("key", &"x".repeat(1000))).unwrap();
        let len = writer.offset();
        writer.sync().unwrap();

        // Buffer window far smaller than the single item it has to read.
        let mut prefetch = PrefetchBuffer::open(&path, len, 8).unwrap();
        let (it, _) = prefetch.read_item().unwrap().unwrap();
        assert_eq!(it.value.len(), 1000);
        assert!(prefetch.read_item().unwrap().is_none());
    }
}
