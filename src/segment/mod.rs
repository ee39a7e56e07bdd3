// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segmented Storage Engine: append-only segments holding cached items,
//! backed by either RAM ([`ram::RamSegment`]) or a file
//! ([`file::FileSegmentWriter`]/[`file::FileSegmentReader`]) depending on
//! [`crate::config::StorageKind`] (spec §3, "Segmented Storage Engine").

pub mod file;
pub mod item;
pub mod prefetch;
pub mod ram;
pub mod stats;
pub mod trailer;

use crate::id::SegmentId;
use crate::value::ExpireAt;
use item::Item;
use ram::RamSegment;
use stats::GcStats;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a segment, per spec §3: segments are written to
/// while `Open`, become immutable once `Sealed`, and are returned to the
/// [`crate::id::IdGenerator`] free pool once `Recycled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Accepting appends; exactly one per rank is open at a time.
    Open,
    /// Full or rolled over; immutable, eligible for scavenging.
    Sealed,
    /// Reclaimed by the Scavenger; its ID has been released for reuse.
    Recycled,
}

/// Backend-agnostic segment identity and liveness bookkeeping.
#[derive(Debug)]
pub struct Info {
    id: SegmentId,
    total_items: AtomicU64,
    total_active_items: AtomicU64,
    max_expire_at: AtomicU64,
    creation_time: u64,
    state: parking_lot::Mutex<SegmentState>,
    gc_stats: GcStats,
}

impl Info {
    fn new(id: SegmentId, creation_time: u64) -> Self {
        Self {
            id,
            total_items: AtomicU64::new(0),
            total_active_items: AtomicU64::new(0),
            max_expire_at: AtomicU64::new(0),
            creation_time,
            state: parking_lot::Mutex::new(SegmentState::Open),
            gc_stats: GcStats::default(),
        }
    }

    /// This segment's ID.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Number of items ever written to this segment (including ones since
    /// invalidated).
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.total_items.load(Ordering::Acquire)
    }

    /// Number of items still reachable from the Memory Index, as tracked
    /// opportunistically; the Scavenger's authoritative count comes from
    /// scanning against the index directly (spec §3, victim selection).
    #[must_use]
    pub fn total_active_items(&self) -> u64 {
        self.total_active_items.load(Ordering::Acquire)
    }

    /// Maximum `expire` seen across this segment's items (`0` = none expire).
    #[must_use]
    pub fn max_expire_at(&self) -> ExpireAt {
        self.max_expire_at.load(Ordering::Acquire)
    }

    /// Wall-clock milliseconds this segment was opened.
    #[must_use]
    pub fn creation_time(&self) -> u64 {
        self.creation_time
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SegmentState {
        *self.state.lock()
    }

    /// Runtime GC statistics (dead items/bytes).
    #[must_use]
    pub fn gc_stats(&self) -> &GcStats {
        &self.gc_stats
    }

    fn record_item(&self, expire: ExpireAt) {
        self.total_items.fetch_add(1, Ordering::AcqRel);
        self.total_active_items.fetch_add(1, Ordering::AcqRel);
        self.max_expire_at.fetch_max(expire, Ordering::AcqRel);
    }

    /// Called by the Memory Index/Scavenger when an item in this segment
    /// becomes unreachable (overwritten, deleted, or expired).
    pub fn record_item_dead(&self, bytes: u64) {
        self.total_active_items.fetch_sub(1, Ordering::AcqRel);
        self.gc_stats.mark_dead(bytes);
    }

    fn seal(&self) {
        *self.state.lock() = SegmentState::Sealed;
    }

    /// Marks this segment recycled after the Scavenger has drained it.
    pub fn mark_recycled(&self) {
        *self.state.lock() = SegmentState::Recycled;
    }

    /// Fraction of this segment's items that are still live.
    #[must_use]
    pub fn alive_ratio(&self) -> f32 {
        let total = self.total_items();
        if total == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.total_active_items() as f32 / total as f32
        }
    }
}

/// Where a segment's bytes live.
enum Backend {
    Ram(RamSegment),
    File {
        writer: Option<file::FileSegmentWriter>,
        reader: file::FileSegmentReader,
        path: PathBuf,
        sealed_len: AtomicU64,
    },
}

/// A single append-only segment: the unit the Scavenger recycles and the
/// Storage Pool hands out as "the current segment for rank N."
pub struct Segment {
    info: Info,
    backend: Backend,
}

impl Segment {
    /// Creates a new open RAM-backed segment.
    #[must_use]
    pub fn new_ram(id: SegmentId, capacity: usize, creation_time: u64) -> Self {
        Self {
            info: Info::new(id, creation_time),
            backend: Backend::Ram(RamSegment::with_capacity(capacity)),
        }
    }

    /// Creates a new open file-backed segment at `path`.
    pub fn new_file(id: SegmentId, path: PathBuf, creation_time: u64) -> crate::Result<Self> {
        let writer = file::FileSegmentWriter::create(&path)?;
        let reader = file::FileSegmentReader::new(&path);
        Ok(Self {
            info: Info::new(id, creation_time),
            backend: Backend::File {
                writer: Some(writer),
                reader,
                path,
                sealed_len: AtomicU64::new(0),
            },
        })
    }

    /// Reconstructs an already-sealed file segment from its trailer,
    /// without reopening a writer. Liveness (`total_active_items`) starts
    /// optimistic (equal to `total_items`); the Memory Index rebuild that
    /// follows recovery corrects it as it replays each segment's items.
    pub fn recover_file(
        id: SegmentId,
        path: PathBuf,
        trailer: &trailer::SegmentTrailer,
    ) -> crate::Result<Self> {
        let reader = file::FileSegmentReader::new(&path);
        let info = Info::new(id, trailer.creation_time);
        info.total_items.store(trailer.total_items, Ordering::Release);
        info.total_active_items
            .store(trailer.total_items, Ordering::Release);
        info.max_expire_at
            .store(trailer.max_expire_at, Ordering::Release);
        info.seal();

        Ok(Self {
            info,
            backend: Backend::File {
                writer: None,
                reader,
                path,
                sealed_len: AtomicU64::new(trailer.total_bytes),
            },
        })
    }

    /// This segment's metadata/liveness handle.
    #[must_use]
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Appends `key`/`value` with the given expiration, returning the
    /// offset the [`crate::index::entry::MainEntry`] should point at.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment is sealed or the write fails.
    pub fn append(&self, key: &[u8], value: &[u8], expire: ExpireAt) -> crate::Result<u64> {
        if self.info.state() != SegmentState::Open {
            return Err(crate::Error::Unrecoverable(format!(
                "segment {} is not open for writes",
                self.info.id
            )));
        }

        let item = Item {
            key: crate::Slice::from(key),
            value: crate::Slice::from(value),
            expire,
        };

        let offset = match &self.backend {
            Backend::Ram(ram) => ram.append(&item)?,
            Backend::File { writer, .. } => writer
                .as_ref()
                .expect("writer present while segment is open")
                .append(&item)?,
        };

        self.info.record_item(expire);
        Ok(offset)
    }

    /// Reads the item at `offset`.
    pub fn read_at(&self, offset: u64) -> crate::Result<Item> {
        match &self.backend {
            Backend::Ram(ram) => ram.read_at(offset),
            Backend::File { reader, .. } => reader.read_at(self.info.id, offset),
        }
    }

    /// Seals the segment: no further appends are accepted, and (for
    /// file-backed segments) the writer is flushed and closed.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing a file-backed segment fails.
    pub fn seal(&mut self) -> crate::Result<()> {
        if let Backend::File {
            writer,
            sealed_len,
            path,
            ..
        } = &mut self.backend
        {
            if let Some(w) = writer.take() {
                let total_bytes = w.offset();
                w.sync()?;

                let trailer = trailer::SegmentTrailer {
                    id: self.info.id,
                    total_items: self.info.total_items(),
                    total_bytes,
                    max_expire_at: self.info.max_expire_at(),
                    creation_time: self.info.creation_time,
                };
                let mut file = std::fs::OpenOptions::new().append(true).open(&path)?;
                {
                    use crate::coding::Serializable;
                    trailer.serialize(&mut file)?;
                }
                file.sync_all()?;

                sealed_len.store(total_bytes, Ordering::Release);
            }
        }
        self.info.seal();
        Ok(())
    }

    /// Current size in bytes (growing while open, fixed once sealed).
    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        match &self.backend {
            Backend::Ram(ram) => ram.len(),
            Backend::File {
                writer,
                sealed_len,
                ..
            } => writer
                .as_ref()
                .map_or_else(|| sealed_len.load(Ordering::Acquire), file::FileSegmentWriter::offset),
        }
    }

    /// Opens a prefetch-buffered sequential scanner over this segment, for
    /// file-backed segments only. Returns `None` for RAM segments, which
    /// should be scanned via [`ram::RamSegment::iter`] directly instead.
    pub fn prefetch_scan(&self, buffer_size: usize) -> crate::Result<Option<prefetch::PrefetchBuffer>> {
        match &self.backend {
            Backend::Ram(_) => Ok(None),
            Backend::File { path, .. } => Ok(Some(prefetch::PrefetchBuffer::open(
                path,
                self.len_bytes(),
                buffer_size,
            )?)),
        }
    }

    /// Iterates every `(Item, offset)` in the segment regardless of backend.
    pub fn scan(&self) -> crate::Result<Box<dyn Iterator<Item = crate::Result<(Item, u64)>> + '_>> {
        match &self.backend {
            Backend::Ram(ram) => Ok(Box::new(ram.iter())),
            Backend::File { reader, .. } => Ok(Box::new(reader.iter(self.len_bytes())?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_segment_append_read_and_seal() {
        let seg = Segment::new_ram(1, 4096, 0);
        let offset = seg.append(b"k", b"v", 0).unwrap();
        let item = seg.read_at(offset).unwrap();
        assert_eq!(&*item.key, b"k");
        assert_eq!(seg.info().total_items(), 1);
        assert_eq!(seg.info().total_active_items(), 1);
    }

    #[test]
    fn sealed_segment_rejects_appends() {
        let mut seg = Segment::new_ram(1, 4096, 0);
        seg.seal().unwrap();
        assert!(seg.append(b"k", b"v", 0).is_err());
    }

    #[test]
    fn file_segment_round_trips_and_scans() {
        let dir = tempfile::tempdir().unwrap();
        let mut seg = Segment::new_file(1, dir.path().join("0001.seg"), 0).unwrap();
        seg.append(b"a", b"1", 0).unwrap();
        seg.append(b"b", b"2", 0).unwrap();
        seg.seal().unwrap();

        let items: Vec<_> = seg.scan().unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn dead_item_lowers_alive_ratio() {
        let seg = Segment::new_ram(1, 4096, 0);
        seg.append(b"a", b"1", 0).unwrap();
        seg.append(b"b", b"2", 0).unwrap();
        assert_eq!(seg.info().alive_ratio(), 1.0);

        seg.info().record_item_dead(10);
        assert_eq!(seg.info().alive_ratio(), 0.5);
    }
}
