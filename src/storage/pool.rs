// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Concrete [`super::StorageEngine`]: a pool of active segments (one per
//! storage-pool slot, spec §6 `cache.storage.pool.size`) plus a table of
//! every sealed segment known to the cache.

use super::{StorageEngine, Written};
use crate::config::{CacheConfig, StorageKind};
use crate::hash::HashMap;
use crate::id::{IdGenerator, SegmentId};
use crate::segment::item::Item;
use crate::segment::Segment;
use crate::value::ExpireAt;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;

fn segment_file_name(id: SegmentId) -> String {
    format!("{id:016x}.seg")
}

/// Owns segment allocation and the sealed-segment table for one cache.
pub struct StoragePool {
    storage: StorageKind,
    data_dir: Option<PathBuf>,
    segment_size_bytes: u64,
    ids: IdGenerator,
    /// One active-segment slot per `cache.storage.pool.size`; a rank picks
    /// a slot via `rank % slots.len()` so related-popularity writes land
    /// together without needing one segment per rank.
    slots: Vec<Mutex<Arc<Segment>>>,
    sealed: RwLock<HashMap<SegmentId, Arc<Segment>>>,
}

impl StoragePool {
    /// Creates a fresh pool (no recovery) from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial active segments can't be created
    /// (e.g. the data directory can't be written to).
    pub fn new(config: &CacheConfig, now_millis: u64) -> crate::Result<Self> {
        let ids = IdGenerator::new(0);
        let pool_size = config.storage_pool_size.max(1) as usize;

        let mut slots = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let id = ids.next();
            let segment = Self::open_segment(config, id, now_millis)?;
            slots.push(Mutex::new(Arc::new(segment)));
        }

        Ok(Self {
            storage: config.storage,
            data_dir: config.data_dir.clone(),
            segment_size_bytes: config.segment_size_bytes,
            ids,
            slots,
            sealed: RwLock::new(HashMap::default()),
        })
    }

    /// Recovers a file-backed pool from `config.data_dir`: every `*.seg`
    /// file whose trailer parses becomes a sealed segment; corrupt or
    /// partially-written files (a crash mid-append) are skipped with a
    /// warning rather than failing startup, matching the spec's general
    /// "best effort recovery, rebuild what can't be salvaged" stance for
    /// the in-RAM Memory Index.
    ///
    /// # Errors
    ///
    /// Returns an error if `data_dir` can't be listed, or the initial
    /// active segments can't be created.
    pub fn recover(config: &CacheConfig, now_millis: u64) -> crate::Result<Self> {
        let Some(data_dir) = &config.data_dir else {
            return Self::new(config, now_millis);
        };

        std::fs::create_dir_all(data_dir)?;
        let mut sealed = HashMap::default();
        let mut max_id = 0u64;

        for entry in std::fs::read_dir(data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("seg") {
                continue;
            }

            match Self::reopen_sealed(&path) {
                Ok((id, segment)) => {
                    max_id = max_id.max(id);
                    sealed.insert(id, Arc::new(segment));
                }
                Err(e) => {
                    log::warn!("skipping unreadable segment {}: {e}", path.display());
                }
            }
        }

        let ids = IdGenerator::new(max_id + 1);
        let pool_size = config.storage_pool_size.max(1) as usize;
        let mut slots = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let id = ids.next();
            let segment = Self::open_segment(config, id, now_millis)?;
            slots.push(Mutex::new(Arc::new(segment)));
        }

        Ok(Self {
            storage: config.storage,
            data_dir: config.data_dir.clone(),
            segment_size_bytes: config.segment_size_bytes,
            ids,
            slots,
            sealed: RwLock::new(sealed),
        })
    }

    fn reopen_sealed(path: &std::path::Path) -> crate::Result<(SegmentId, Segment)> {
        use crate::coding::Deserializable;
        use crate::segment::trailer::{SegmentTrailer, TRAILER_SIZE};
        use std::io::{Read, Seek};

        let mut file = std::fs::File::open(path)?;
        let total_len = file.metadata()?.len();
        if total_len < TRAILER_SIZE as u64 {
            return Err(crate::Error::Unrecoverable(format!(
                "{} shorter than one trailer",
                path.display()
            )));
        }

        file.seek(std::io::SeekFrom::End(-(TRAILER_SIZE as i64)))?;
        let mut buf = vec![0u8; TRAILER_SIZE];
        file.read_exact(&mut buf)?;
        let mut cursor = std::io::Cursor::new(buf);
        let trailer = SegmentTrailer::deserialize(&mut cursor)?;

        let segment = Segment::recover_file(trailer.id, path.to_path_buf(), &trailer)?;
        Ok((trailer.id, segment))
    }

    fn open_segment(config: &CacheConfig, id: SegmentId, now_millis: u64) -> crate::Result<Segment> {
        match config.storage {
            StorageKind::OffHeap => Ok(Segment::new_ram(
                id,
                config.segment_size_bytes as usize,
                now_millis,
            )),
            StorageKind::File => {
                let dir = config
                    .data_dir
                    .as_ref()
                    .ok_or_else(|| crate::Error::InvalidConfig("data.dir.name required".into()))?;
                Segment::new_file(id, dir.join(segment_file_name(id)), now_millis)
            }
        }
    }

    fn slot_for(&self, rank: u8) -> usize {
        rank as usize % self.slots.len()
    }
}

impl StorageEngine for StoragePool {
    fn put(&self, rank: u8, key: &[u8], value: &[u8], expire: ExpireAt) -> crate::Result<Written> {
        let slot = &self.slots[self.slot_for(rank)];
        let mut active = slot.lock();

        if active.len_bytes() + key.len() as u64 + value.len() as u64 + 32 > self.segment_size_bytes {
            let sealed_id = active.info().id();
            let old = std::mem::replace(&mut *active, Arc::new(self.roll_new_segment()?));
            // Nothing else clones an active slot's `Arc`, so this always
            // succeeds; `get()` only clones `Arc`s out of the sealed table.
            let mut sealed_segment =
                Arc::try_unwrap(old).unwrap_or_else(|_| unreachable!("active segment uniquely owned by its slot"));
            sealed_segment.seal()?;
            self.sealed.write().insert(sealed_id, Arc::new(sealed_segment));
        }

        let offset = active.append(key, value, expire)?;
        Ok(Written {
            segment_id: active.info().id(),
            offset,
        })
    }

    fn get(&self, segment_id: SegmentId, offset: u64) -> crate::Result<Item> {
        if let Some(segment) = self.sealed.read().get(&segment_id) {
            return segment.read_at(offset);
        }
        for slot in &self.slots {
            let active = slot.lock();
            if active.info().id() == segment_id {
                return active.read_at(offset);
            }
        }
        Err(crate::Error::Unrecoverable(format!(
            "segment {segment_id} not found"
        )))
    }

    fn sealed_segments(&self) -> Vec<Arc<Segment>> {
        self.sealed.read().values().cloned().collect()
    }

    fn release_segment(&self, segment_id: SegmentId) -> crate::Result<()> {
        if let Some(segment) = self.sealed.write().remove(&segment_id) {
            segment.info().mark_recycled();
            if self.storage == StorageKind::File {
                if let Some(dir) = &self.data_dir {
                    let path = dir.join(segment_file_name(segment_id));
                    if path.exists() {
                        std::fs::remove_file(path)?;
                    }
                }
            }
            self.ids.release(segment_id);
        }
        Ok(())
    }

    fn total_bytes(&self) -> u64 {
        let sealed: u64 = self.sealed.read().values().map(|s| s.len_bytes()).sum();
        let active: u64 = self.slots.iter().map(|s| s.lock().len_bytes()).sum();
        sealed + active
    }
}

impl StoragePool {
    fn roll_new_segment(&self) -> crate::Result<Segment> {
        let id = self.ids.next();
        match self.storage {
            StorageKind::OffHeap => Ok(Segment::new_ram(id, self.segment_size_bytes as usize, 0)),
            StorageKind::File => {
                let dir = self
                    .data_dir
                    .as_ref()
                    .expect("file storage always has a data_dir (validated at config time)");
                Segment::new_file(id, dir.join(segment_file_name(id)), 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn ram_config() -> CacheConfig {
        let mut cfg = CacheConfig::new("test", StorageKind::OffHeap);
        cfg.storage_pool_size = 2;
        cfg.segment_size_bytes = 256;
        cfg
    }

    #[test]
    fn put_then_get_round_trips() {
        let pool = StoragePool::new(&ram_config(), 0).unwrap();
        let written = pool.put(0, b"k", b"v", 0).unwrap();
        let item = pool.get(written.segment_id, written.offset).unwrap();
        assert_eq!(&*item.key, b"k");
    }

    #[test]
    fn rollover_seals_full_segments() {
        let pool = StoragePool::new(&ram_config(), 0).unwrap();
        for i in 0..20u32 {
            pool.put(0, &i.to_be_bytes(), &[0u8; 20], 0).unwrap();
        }
        assert!(!pool.sealed_segments().is_empty());
    }

    #[test]
    fn release_segment_frees_its_id() {
        let pool = StoragePool::new(&ram_config(), 0).unwrap();
        for i in 0..20u32 {
            pool.put(0, &i.to_be_bytes(), &[0u8; 20], 0).unwrap();
        }
        let sealed = pool.sealed_segments();
        assert!(!sealed.is_empty());
        let id = sealed[0].info().id();
        pool.release_segment(id).unwrap();
        assert!(pool.get(id, 0).is_err());
    }
}
