// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Cache Facade: the public entry point tying the Memory Index, Segmented
//! Storage Engine, Scavenger, Admission Policy, Throughput Controller, and
//! victim-cache delegation together into `put`/`get`/`delete` (spec §3,
//! "Cache Facade").

use crate::admission::{AdmissionPolicy, AdmissionQueue, AlwaysAdmit, RandomRatio};
use crate::config::{AdmissionKind, CacheConfig, RecyclingPolicy};
use crate::error::{GetOutcome, PutOutcome};
use crate::hash::hash64;
use crate::index::entry::{EntryLocation, MainEntry};
use crate::index::{FindResult, MemoryIndex};
use crate::rank::Rank;
use crate::scavenger::selector::{Lrc, MinAlive};
use crate::scavenger::{GcReport, Scavenger};
use crate::scheduler::PeriodicTask;
use crate::segment::item::Item;
use crate::segment::Segment;
use crate::stats::{CacheStats, StatsSnapshot};
use crate::storage::{StorageEngine, StoragePool};
use crate::throughput::{ThroughputController, ThroughputDial};
use crate::value::{is_expired, ExpireAt, NO_EXPIRY};
use crate::victim::VictimSink;
use crate::Slice;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A single named cache instance: admission, storage, index, scavenging,
/// and (optionally) a victim cache and throughput throttling, all wired
/// from one [`CacheConfig`].
pub struct Cache {
    config: CacheConfig,
    storage: Arc<StoragePool>,
    index: Arc<MemoryIndex>,
    scavenger: Arc<Scavenger<StoragePool>>,
    admission: Arc<dyn AdmissionPolicy>,
    throughput: Option<Arc<ThroughputController>>,
    victim: Mutex<Option<Arc<dyn VictimSink>>>,
    stats: CacheStats,
    background: Mutex<Vec<PeriodicTask>>,
}

impl Cache {
    /// Builds a fresh cache (no recovery) from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the initial segments
    /// can't be created.
    pub fn new(config: CacheConfig) -> crate::Result<Self> {
        config.validate()?;
        let now = crate::clock::now_millis();
        let storage = Arc::new(StoragePool::new(&config, now)?);
        Self::from_storage(config, storage)
    }

    /// Builds a cache from `config`, recovering any sealed segments already
    /// present in `config.data_dir` and rebuilding the Memory Index from
    /// them (spec §3, "Memory Index — recovery").
    ///
    /// Deletes are not themselves persisted (no tombstone is written to a
    /// segment), so a key deleted shortly before a crash may reappear after
    /// recovery if an earlier write for it survives in a sealed segment.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid, the data directory can't be
    /// scanned, or a segment's contents can't be read back.
    pub fn recover(config: CacheConfig) -> crate::Result<Self> {
        config.validate()?;
        let now = crate::clock::now_millis();
        let storage = Arc::new(StoragePool::recover(&config, now)?);

        let mut sealed = storage.sealed_segments();
        sealed.sort_by_key(|s| s.info().id());

        let cache = Self::from_storage(config, storage)?;

        // Replay every sealed segment in creation order so that, for a key
        // written more than once across segments, the chronologically last
        // write wins — matching what the index held before the crash.
        let mut last_seen: crate::hash::HashMap<u64, (crate::id::SegmentId, u64, u32)> =
            crate::hash::HashMap::default();
        let by_id: crate::hash::HashMap<crate::id::SegmentId, Arc<Segment>> =
            sealed.iter().map(|s| (s.info().id(), s.clone())).collect();

        for segment in &sealed {
            for result in segment.scan()? {
                let (item, offset) = result?;
                let hash = hash64(&item.key);
                #[allow(clippy::cast_possible_truncation)]
                let value_size = item.value.len() as u32;

                if let Some((old_segment_id, _old_offset, old_size)) = last_seen.get(&hash).copied() {
                    if let Some(old_segment) = by_id.get(&old_segment_id) {
                        old_segment.info().record_item_dead(u64::from(old_size));
                    }
                }

                cache.index.insert(
                    &item.key,
                    item.expire,
                    EntryLocation::Segment {
                        segment_id: segment.info().id(),
                        offset,
                        value_size,
                    },
                );
                last_seen.insert(hash, (segment.info().id(), offset, value_size));
            }
        }

        Ok(cache)
    }

    fn from_storage(config: CacheConfig, storage: Arc<StoragePool>) -> crate::Result<Self> {
        let index = Arc::new(MemoryIndex::new(
            config.initial_slot_count(),
            config.num_ranks,
            config.slru_num_segments,
            config.slru_insert_point,
        ));

        let selector: Box<dyn crate::scavenger::selector::RecyclingSelector> = match config.recycling_policy {
            RecyclingPolicy::MinAlive => Box::new(MinAlive),
            RecyclingPolicy::Lrc => Box::new(Lrc),
        };
        let scavenger = Arc::new(Scavenger::new(&config, storage.clone(), index.clone(), selector));

        // Converts a fraction of the cache's byte budget into a hash count
        // via a crude 64-bytes-per-item guess (the queue only stores
        // hashes, so overshooting this estimate just means a slightly
        // larger ghost cache).
        let aq_size_from_ratio = |ratio: f32| -> usize {
            if config.max_size_bytes == 0 {
                1 << 16
            } else {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    ((config.max_size_bytes as f64 * f64::from(ratio)) / 64.0) as usize
                }
            }
        };

        let (admission, throughput): (Arc<dyn AdmissionPolicy>, Option<Arc<ThroughputController>>) =
            match config.admission {
                AdmissionKind::Always => {
                    let dial = ThroughputDial::ScavengerDumpBelow(scavenger.clone());
                    (Arc::new(AlwaysAdmit), Some(Arc::new(ThroughputController::new(&config, dial))))
                }
                AdmissionKind::AdmissionQueue => {
                    // spec §4.4 dial (a): the Throughput Controller steps
                    // this queue's tracked-hash capacity between
                    // `admission.queue.min.size` and `.max.size`.
                    let start = aq_size_from_ratio(config.aq_start_size_ratio).max(1024);
                    let min_size = aq_size_from_ratio(config.aq_min_size_ratio).max(1);
                    let max_size = aq_size_from_ratio(config.aq_max_size_ratio).max(min_size).max(start);
                    let queue = Arc::new(AdmissionQueue::new(start));
                    let dial = ThroughputDial::AdmissionQueueSize {
                        queue: queue.clone(),
                        min_size,
                        max_size,
                    };
                    let controller = Arc::new(ThroughputController::new(&config, dial));
                    (queue, Some(controller))
                }
                AdmissionKind::RandomRatio => {
                    let ratio = Arc::new(RandomRatio::new(config.random_admission_ratio_start));
                    let dial = ThroughputDial::ScavengerDumpBelow(scavenger.clone());
                    let controller = Arc::new(ThroughputController::new(&config, dial));
                    (ratio, Some(controller))
                }
            };

        Ok(Self {
            config,
            storage,
            index,
            scavenger,
            admission,
            throughput,
            victim: Mutex::new(None),
            stats: CacheStats::default(),
            background: Mutex::new(Vec::new()),
        })
    }

    /// Installs (or clears, with `None`) the victim cache that evicted-but-
    /// still-live items are handed to.
    pub fn set_victim(&self, victim: Option<Arc<dyn VictimSink>>) {
        *self.victim.lock() = victim;
    }

    /// Spawns the background Scavenger and (if configured) Throughput
    /// Controller ticks, per `scavenger.run.interval.sec` /
    /// `throughput.check.interval.sec`. The returned tasks are owned by
    /// `self` and stopped on drop; calling this more than once adds
    /// another set of tasks rather than replacing the existing ones.
    pub fn start_background_tasks(self: &Arc<Self>) {
        let scavenger_cache = self.clone();
        let scavenger_task = PeriodicTask::spawn(
            Duration::from_secs(self.config.scavenger_run_interval_secs.max(1)),
            move || {
                if let Err(e) = scavenger_cache.run_scavenger(false) {
                    log::warn!("scavenger pass failed: {e}");
                }
            },
        );

        let mut tasks = vec![scavenger_task];

        if let Some(throughput) = self.throughput.clone() {
            let interval = throughput.check_interval_secs();
            tasks.push(PeriodicTask::spawn(Duration::from_secs(interval), move || {
                throughput.tick();
            }));
        }

        self.background.lock().extend(tasks);
    }

    /// Stops any background tasks started via [`Self::start_background_tasks`].
    pub fn stop_background_tasks(&self) {
        for task in self.background.lock().drain(..) {
            task.stop();
        }
    }

    fn occupancy(&self) -> f32 {
        if self.config.max_size_bytes == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.storage.total_bytes() as f32 / self.config.max_size_bytes as f32
        }
    }

    /// Inserts or overwrites `key` at rank `0`, honoring the admission
    /// policy for new keys (overwrites of an already-cached key always
    /// proceed, per spec §4.5: admission gates new entries, not updates).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage write fails.
    pub fn put(&self, key: &[u8], value: &[u8], expire: ExpireAt) -> crate::Result<PutOutcome> {
        self.put_with_rank(key, value, expire, 0)
    }

    /// Like [`Self::put`], placing the entry at the given popularity `rank`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRank`] if `rank` is out of
    /// `[0, cache.popularity.number.ranks)`, or propagates a storage error.
    pub fn put_with_rank(&self, key: &[u8], value: &[u8], expire: ExpireAt, rank: u8) -> crate::Result<PutOutcome> {
        let rank = Rank::new(rank, self.config.num_ranks)?;
        let now = crate::clock::now_millis();

        let is_update = matches!(self.index.find(key, now), FindResult::Found(_));

        if !is_update && !self.admission.admit(key) {
            self.stats.record_write(true);
            return Ok(PutOutcome::Rejected);
        }

        if self.occupancy() >= self.config.write_rejection_threshold {
            self.stats.record_write(true);
            return Ok(PutOutcome::Rejected);
        }

        let location = if self.config.index_data_embedded
            && (key.len() + value.len()) as u64 <= u64::from(self.config.index_data_embedded_size)
        {
            // Small enough to embed directly in the index entry, bypassing
            // the Segmented Storage Engine entirely (spec §3, Index Entry:
            // `index.data.embedded`).
            EntryLocation::Embedded {
                value: Slice::from(value),
            }
        } else {
            let written = self.storage.put(rank.get(), key, value, expire)?;
            #[allow(clippy::cast_possible_truncation)]
            let value_size = value.len() as u32;
            EntryLocation::Segment {
                segment_id: written.segment_id,
                offset: written.offset,
                value_size,
            }
        };

        let (admitted, evicted) = self.index.insert_evicting(key, expire, location);

        if !admitted {
            self.stats.record_write(true);
            return Ok(PutOutcome::Rejected);
        }

        self.admission.record_admitted(key);
        if let Some(throughput) = &self.throughput {
            #[allow(clippy::cast_possible_truncation)]
            throughput.record_write((key.len() + value.len()) as u64);
        }
        self.stats.record_write(false);
        self.handle_evicted(evicted, now)?;

        Ok(if is_update { PutOutcome::Updated } else { PutOutcome::Inserted })
    }

    /// Hands a tail-evicted entry down to the victim cache, if one is
    /// configured and the entry hadn't already expired.
    fn handle_evicted(&self, evicted: Option<MainEntry>, now: ExpireAt) -> crate::Result<()> {
        let Some(entry) = evicted else {
            return Ok(());
        };
        if is_expired(entry.expire, now) {
            return Ok(());
        }
        let Some(victim) = self.victim.lock().clone() else {
            return Ok(());
        };

        // The evicted entry only carries the key's hash, not its bytes,
        // so the victim cache is keyed on the hash rather than the
        // original key (the Memory Index never stores key bytes, spec §3).
        let value = self.read_location(&entry.location)?;
        let key_placeholder = entry.hash.to_be_bytes();
        crate::victim::delegate(&victim, &key_placeholder, &value, entry.expire, 0)
    }

    fn read_location(&self, location: &EntryLocation) -> crate::Result<Slice> {
        match location {
            EntryLocation::Embedded { value } => Ok(value.clone()),
            EntryLocation::Segment { segment_id, offset, .. } => {
                let item: Item = self.storage.get(*segment_id, *offset)?;
                Ok(item.value)
            }
        }
    }

    /// Looks up `key` and copies its value into `out_buf`, returning how
    /// many bytes were written (or the value's true length, if `out_buf`
    /// was too small to hold it).
    ///
    /// # Errors
    ///
    /// Returns an error if the backing segment can't be read.
    pub fn get(&self, key: &[u8], out_buf: &mut [u8]) -> crate::Result<GetOutcome> {
        match self.get_with_victim_fallback(key)? {
            None => Ok(GetOutcome::NotFound),
            Some(value) => {
                if value.len() > out_buf.len() {
                    return Ok(GetOutcome::BufferTooSmall(value.len()));
                }
                out_buf[..value.len()].copy_from_slice(&value);
                Ok(GetOutcome::Found(value.len()))
            }
        }
    }

    /// Looks up `key` and returns its value bytes directly, for callers
    /// that don't need the fixed-buffer [`GetOutcome`] contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing segment can't be read.
    pub fn get_owned(&self, key: &[u8]) -> crate::Result<Option<Slice>> {
        self.get_with_victim_fallback(key)
    }

    /// Looks up `key` locally and, on a main-miss, delegates to the victim
    /// cache if one is configured (spec §4.5: "on main-miss + victim-hit").
    /// When `cache.victim.promotion.on.hit` is set, a victim hit is written
    /// back into this cache and removed from the victim, preserving the
    /// victim's stored `expire`.
    fn get_with_victim_fallback(&self, key: &[u8]) -> crate::Result<Option<Slice>> {
        let now = crate::clock::now_millis();
        match self.index.find(key, now) {
            FindResult::Found(entry) => {
                let value = self.read_location(&entry.location)?;
                self.stats.record_get(true);
                return Ok(Some(value));
            }
            FindResult::Expired(_) => {
                self.stats.record_expired_eviction();
                self.index.delete(key);
            }
            FindResult::NotFound => {}
        }

        let Some(victim) = self.victim.lock().clone() else {
            self.stats.record_get(false);
            return Ok(None);
        };

        match victim.lookup_for_host(key)? {
            Some((value, expire)) => {
                self.stats.record_get(true);
                if self.config.victim_promotion_on_hit {
                    victim.remove_for_host(key);
                    self.promote_from_victim(key, &value, expire)?;
                }
                Ok(Some(value))
            }
            None => {
                self.stats.record_get(false);
                Ok(None)
            }
        }
    }

    /// Writes a value recovered from the victim cache back into this
    /// cache's own storage/index, bypassing the admission policy (the item
    /// already earned its place by having been admitted once before).
    fn promote_from_victim(&self, key: &[u8], value: &[u8], expire: ExpireAt) -> crate::Result<()> {
        let written = self.storage.put(0, key, value, expire)?;
        #[allow(clippy::cast_possible_truncation)]
        let value_size = value.len() as u32;
        self.index.insert(
            key,
            expire,
            EntryLocation::Segment {
                segment_id: written.segment_id,
                offset: written.offset,
                value_size,
            },
        );
        Ok(())
    }

    /// Removes `key`, if present. Returns `true` if a live entry was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.index.delete(key).is_some()
    }

    /// Explicitly expires `key` as of `now`, without waiting for a lazy
    /// `get`/Scavenger pass to notice.
    pub fn expire(&self, key: &[u8], now: ExpireAt) -> bool {
        match self.index.find(key, now) {
            FindResult::Found(_) => false,
            FindResult::Expired(_) => {
                self.stats.record_expired_eviction();
                self.index.delete(key);
                true
            }
            FindResult::NotFound => false,
        }
    }

    /// Runs one Scavenger pass now, rather than waiting for the scheduled
    /// tick. `force` bypasses the `scavenger.start.ratio`/`stop.ratio` gates.
    ///
    /// # Errors
    ///
    /// Returns an error if relocating a carried-forward item fails.
    pub fn run_scavenger(&self, force: bool) -> crate::Result<GcReport> {
        self.scavenger.run_once(crate::clock::now_millis(), force)
    }

    /// Current cache-wide counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// This cache's configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current occupied bytes / `cache.data.max.size` (`0.0` if unbounded).
    #[must_use]
    pub fn occupancy_ratio(&self) -> f32 {
        self.occupancy()
    }
}

impl VictimSink for Cache {
    fn admit_from_host(&self, key: &[u8], value: &[u8], expire: ExpireAt, rank: u8) -> crate::Result<()> {
        // A victim cache receives every item handed to it unconditionally
        // (spec: the host's admission decision already happened); forcing
        // the insert past this cache's own admission policy models that by
        // writing directly through storage + index rather than via `put`.
        let written = self.storage.put(rank, key, value, expire)?;
        #[allow(clippy::cast_possible_truncation)]
        let value_size = value.len() as u32;
        self.index.insert(
            key,
            expire,
            EntryLocation::Segment {
                segment_id: written.segment_id,
                offset: written.offset,
                value_size,
            },
        );
        Ok(())
    }

    fn lookup_for_host(&self, key: &[u8]) -> crate::Result<Option<(Slice, ExpireAt)>> {
        let now = crate::clock::now_millis();
        match self.index.find(key, now) {
            FindResult::Found(entry) => {
                let value = self.read_location(&entry.location)?;
                Ok(Some((value, entry.expire)))
            }
            FindResult::Expired(_) => {
                self.index.delete(key);
                Ok(None)
            }
            FindResult::NotFound => Ok(None),
        }
    }

    fn remove_for_host(&self, key: &[u8]) {
        self.index.delete(key);
    }
}

/// Builds every cache in `config.caches`, wiring victim-cache chains by
/// `victim_name` after validating they form no cycles (spec §3: "no
/// cycles"). Returned in the same order as `config.caches`.
///
/// # Errors
///
/// Returns an error if any cache's configuration is invalid, or the
/// victim-name graph contains a cycle or dangling reference.
pub fn build_caches(config: &crate::config::CarrotCacheConfig) -> crate::Result<Vec<Arc<Cache>>> {
    let edges: Vec<(String, Option<String>)> = config
        .caches
        .iter()
        .map(|c| (c.name.clone(), c.victim_name.clone()))
        .collect();
    crate::victim::validate_no_cycles(&edges)?;

    let mut by_name = std::collections::HashMap::new();
    let mut caches = Vec::with_capacity(config.caches.len());

    for cache_config in &config.caches {
        let cache = Arc::new(Cache::new(cache_config.clone())?);
        by_name.insert(cache_config.name.clone(), cache.clone());
        caches.push(cache);
    }

    for cache_config in &config.caches {
        if let Some(victim_name) = &cache_config.victim_name {
            let host = by_name[&cache_config.name].clone();
            let victim = by_name[victim_name].clone() as Arc<dyn VictimSink>;
            host.set_victim(Some(victim));
        }
    }

    Ok(caches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageKind;

    fn offheap_config() -> CacheConfig {
        let mut cfg = CacheConfig::new("main", StorageKind::OffHeap);
        cfg.storage_pool_size = 1;
        cfg.segment_size_bytes = 4096;
        cfg
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = Cache::new(offheap_config()).unwrap();
        assert_eq!(cache.put(b"k", b"v", NO_EXPIRY).unwrap(), PutOutcome::Inserted);
        assert_eq!(cache.get_owned(b"k").unwrap().as_deref(), Some(b"v".as_slice()));
    }

    #[test]
    fn overwrite_reports_updated() {
        let cache = Cache::new(offheap_config()).unwrap();
        cache.put(b"k", b"v1", NO_EXPIRY).unwrap();
        assert_eq!(cache.put(b"k", b"v2", NO_EXPIRY).unwrap(), PutOutcome::Updated);
        assert_eq!(cache.get_owned(b"k").unwrap().as_deref(), Some(b"v2".as_slice()));
    }

    #[test]
    fn missing_key_is_not_found() {
        let cache = Cache::new(offheap_config()).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(cache.get(b"nope", &mut buf).unwrap(), GetOutcome::NotFound));
    }

    #[test]
    fn get_reports_buffer_too_small() {
        let cache = Cache::new(offheap_config()).unwrap();
        cache.put(b"k", b"a longer value than the buffer", NO_EXPIRY).unwrap();
        let mut buf = [0u8; 4];
        match cache.get(b"k", &mut buf).unwrap() {
            GetOutcome::BufferTooSmall(needed) => assert_eq!(needed, 31),
            other => panic!("expected BufferTooSmall, got {other:?}"),
        }
    }

    #[test]
    fn expired_key_reads_as_not_found_and_is_reclaimed_from_the_index() {
        let cache = Cache::new(offheap_config()).unwrap();
        cache.put(b"k", b"v", 50).unwrap();
        // directly exercise the expiry-aware path via `expire`
        assert!(cache.expire(b"k", 51));
        let mut buf = [0u8; 16];
        assert!(matches!(cache.get(b"k", &mut buf).unwrap(), GetOutcome::NotFound));
    }

    #[test]
    fn delete_removes_the_key() {
        let cache = Cache::new(offheap_config()).unwrap();
        cache.put(b"k", b"v", NO_EXPIRY).unwrap();
        assert!(cache.delete(b"k"));
        let mut buf = [0u8; 16];
        assert!(matches!(cache.get(b"k", &mut buf).unwrap(), GetOutcome::NotFound));
    }

    #[test]
    fn invalid_rank_is_rejected_as_a_caller_error() {
        let cache = Cache::new(offheap_config()).unwrap();
        let err = cache.put_with_rank(b"k", b"v", NO_EXPIRY, 255).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidRank { .. }));
    }

    #[test]
    fn write_rejection_threshold_blocks_further_puts() {
        let mut cfg = offheap_config();
        cfg.max_size_bytes = 1024;
        cfg.write_rejection_threshold = 0.5;
        let cache = Cache::new(cfg).unwrap();

        let mut last = PutOutcome::Inserted;
        for i in 0..64u32 {
            last = cache.put(&i.to_be_bytes(), &[0u8; 32], NO_EXPIRY).unwrap();
        }
        assert_eq!(last, PutOutcome::Rejected);
    }

    #[test]
    fn handle_evicted_delegates_to_victim_when_still_live() {
        let cache = Cache::new(offheap_config()).unwrap();
        let victim = Arc::new(Cache::new({
            let mut cfg = CacheConfig::new("victim", StorageKind::OffHeap);
            cfg.storage_pool_size = 1;
            cfg
        }).unwrap());
        cache.set_victim(Some(victim.clone() as Arc<dyn VictimSink>));

        let evicted = MainEntry {
            hash: hash64(b"evicted-key"),
            expire: NO_EXPIRY,
            hit_count: 0,
            segment: 8,
            location: EntryLocation::Embedded {
                value: Slice::from(b"still-good".as_slice()),
            },
        };
        cache.handle_evicted(Some(evicted), 0).unwrap();
        assert_eq!(victim.stats().writes, 0); // written via admit_from_host, not `put`
        assert!(victim.index.len() == 1);
    }

    #[test]
    fn get_falls_back_to_victim_and_promotes_on_hit() {
        let host = Cache::new(offheap_config()).unwrap();
        let victim = Arc::new(Cache::new({
            let mut cfg = CacheConfig::new("victim", StorageKind::OffHeap);
            cfg.storage_pool_size = 1;
            cfg
        }).unwrap());
        victim.put(b"cold-key", b"cold-value", NO_EXPIRY).unwrap();
        host.set_victim(Some(victim.clone() as Arc<dyn VictimSink>));

        assert_eq!(
            host.get_owned(b"cold-key").unwrap().as_deref(),
            Some(b"cold-value".as_slice())
        );

        // `victim_promotion_on_hit` defaults to true: the item moves up
        // into the host and is removed from the victim.
        assert!(victim.get_owned(b"cold-key").unwrap().is_none());
        assert_eq!(host.get_owned(b"cold-key").unwrap().as_deref(), Some(b"cold-value".as_slice()));
    }

    #[test]
    fn get_serves_from_victim_without_promotion_when_disabled() {
        let mut host_cfg = offheap_config();
        host_cfg.victim_promotion_on_hit = false;
        let host = Cache::new(host_cfg).unwrap();
        let victim = Arc::new(Cache::new({
            let mut cfg = CacheConfig::new("victim", StorageKind::OffHeap);
            cfg.storage_pool_size = 1;
            cfg
        }).unwrap());
        victim.put(b"k", b"v", NO_EXPIRY).unwrap();
        host.set_victim(Some(victim.clone() as Arc<dyn VictimSink>));

        assert_eq!(host.get_owned(b"k").unwrap().as_deref(), Some(b"v".as_slice()));
        // stays down in the victim rather than being copied up
        assert!(victim.get_owned(b"k").unwrap().is_some());
    }

    #[test]
    fn get_without_a_victim_is_a_plain_miss() {
        let host = Cache::new(offheap_config()).unwrap();
        assert!(host.get_owned(b"nope").unwrap().is_none());
    }

    #[test]
    fn handle_evicted_ignores_already_expired_entries() {
        let cache = Cache::new(offheap_config()).unwrap();
        let victim = Arc::new(Cache::new({
            let mut cfg = CacheConfig::new("victim", StorageKind::OffHeap);
            cfg.storage_pool_size = 1;
            cfg
        }).unwrap());
        cache.set_victim(Some(victim.clone() as Arc<dyn VictimSink>));

        let evicted = MainEntry {
            hash: hash64(b"expired-key"),
            expire: 50,
            hit_count: 0,
            segment: 8,
            location: EntryLocation::Embedded {
                value: Slice::from(b"stale".as_slice()),
            },
        };
        cache.handle_evicted(Some(evicted), 1000).unwrap();
        assert!(victim.index.is_empty());
    }

    #[test]
    fn small_values_are_embedded_when_configured() {
        let mut cfg = offheap_config();
        cfg.index_data_embedded = true;
        cfg.index_data_embedded_size = 64;
        let cache = Cache::new(cfg).unwrap();

        cache.put(b"k", b"tiny", NO_EXPIRY).unwrap();
        let bytes_before = cache.storage.total_bytes();
        assert_eq!(cache.get_owned(b"k").unwrap().as_deref(), Some(b"tiny".as_slice()));
        // embedding bypasses the storage engine entirely
        assert_eq!(cache.storage.total_bytes(), bytes_before);
    }

    #[test]
    fn build_caches_wires_victim_chain() {
        let mut main = CacheConfig::new("main", StorageKind::OffHeap);
        main.victim_name = Some("cold".to_string());
        let cold = CacheConfig::new("cold", StorageKind::OffHeap);

        let caches = build_caches(&crate::config::CarrotCacheConfig {
            snapshot_dir: None,
            caches: vec![main, cold],
        })
        .unwrap();

        assert_eq!(caches.len(), 2);
        caches[0].put(b"k", b"v", NO_EXPIRY).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(caches[0].get(b"k", &mut buf).unwrap(), GetOutcome::Found(_)));
    }
}
