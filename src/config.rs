// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Explicit configuration value threaded through constructors.
//!
//! Design Note: "Global `CacheConfig` singleton. Replace with an explicit
//! configuration value threaded through constructors; per-cache
//! configuration overrides live inside that value." Reading these values
//! from a `.conf` file (the `<cacheName>.<key>` scoping in spec §6) is out
//! of scope — callers build a [`CacheConfig`] programmatically, the way
//! `value-log::Config` is always built via its own builder methods, never
//! parsed from disk.

use std::path::PathBuf;

/// Which storage engine backs a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Off-heap (RAM) segments.
    OffHeap,
    /// File-backed segments under `data.dir.name`.
    File,
}

/// Built-in [`crate::admission::AdmissionPolicy`] selection, avoiding
/// class-name-string reflection (Design Note).
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionKind {
    /// Every `put` is admitted unconditionally.
    Always,
    /// Admission Queue: admit only if the key was seen once before (ghost cache).
    AdmissionQueue,
    /// Admit a random fraction of writes, ramped between `start`/`stop`.
    RandomRatio,
}

/// Built-in [`crate::scavenger::RecyclingSelector`] selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecyclingPolicy {
    /// Pick the segment with the fewest active items.
    MinAlive,
    /// Least-Recently-Created: pick the oldest segment regardless of occupancy.
    Lrc,
}

/// Per-cache configuration. Mirrors the `<cacheName>.<key>` scoped options
/// enumerated in spec §6, as typed fields with the documented defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Name of this cache (used only for logging/identification).
    pub name: String,

    /// Which storage engine this cache uses.
    pub storage: StorageKind,

    /// `cache.data.segment.size` — 4 MiB default for off-heap, 256 MiB for file.
    pub segment_size_bytes: u64,

    /// `cache.data.max.size` — 0 = unlimited.
    pub max_size_bytes: u64,

    /// `data.dir.name` — only meaningful for [`StorageKind::File`].
    pub data_dir: Option<PathBuf>,

    /// `scavenger.start.ratio`
    pub scavenger_start_ratio: f32,
    /// `scavenger.stop.ratio`
    pub scavenger_stop_ratio: f32,
    /// `scavenger.dump.entry.below.start`
    pub dump_below_start: f32,
    /// `scavenger.dump.entry.below.stop`
    pub dump_below_stop: f32,
    /// `scavenger.dump.entry.below.step`
    pub dump_below_step: f32,
    /// `scavenger.run.interval.sec`
    pub scavenger_run_interval_secs: u64,
    /// `scavenger.max.segments.before.stall`
    pub scavenger_max_segments_before_stall: u32,
    /// Recycling selector used to pick victim segments.
    pub recycling_policy: RecyclingPolicy,

    /// `cache.popularity.number.ranks`
    pub num_ranks: u8,
    /// `eviction.slru.number.segments`
    pub slru_num_segments: u8,
    /// `eviction.slru.insert.point`
    pub slru_insert_point: u8,

    /// Admission policy used by `put` (non-forced writes).
    pub admission: AdmissionKind,
    /// `admission.queue.start.size` (fraction of full cache)
    pub aq_start_size_ratio: f32,
    /// `admission.queue.min.size`
    pub aq_min_size_ratio: f32,
    /// `admission.queue.max.size`
    pub aq_max_size_ratio: f32,
    /// `cache.readmission.hit.count.min`
    pub readmission_hit_count_min: u32,

    /// `cache.write.avg.rate.limit` bytes/sec
    pub write_avg_rate_limit: u64,
    /// `throughput.check.interval.sec`
    pub throughput_check_interval_secs: u64,
    /// `throughput.tolerance.limit`
    pub throughput_tolerance: f32,
    /// `throughput.adjustment.steps`
    pub throughput_adjustment_steps: u32,
    /// `cache.writes.max.wait.time.ms`
    pub writes_max_wait_time_ms: u64,

    /// `index.slots.power` — slot count is `2^power`.
    pub index_slots_power: u8,
    /// `index.data.embedded`
    pub index_data_embedded: bool,
    /// `index.data.embedded.size`
    pub index_data_embedded_size: u32,

    /// `cache.expire.start.bin.value`
    pub expire_start_bin_value: u64,
    /// `cache.expire.multiplier.value`
    pub expire_multiplier_value: u32,

    /// `sparse.files.support`
    pub sparse_files_support: bool,
    /// `cache.minimum.active.dataset.ratio`
    pub minimum_active_dataset_ratio: f32,
    /// `cache.storage.pool.size`
    pub storage_pool_size: u32,
    /// `cache.victim.promotion.on.hit`
    pub victim_promotion_on_hit: bool,
    /// `cache.eviction.disabled.mode`
    pub eviction_disabled_mode: bool,
    /// `file.prefetch.buffer.size`
    pub prefetch_buffer_size: usize,
    /// `cache.block.writer.block.size`
    pub block_writer_block_size: usize,
    /// `cache.random.admission.ratio.start`
    pub random_admission_ratio_start: f32,
    /// `cache.random.admission.ratio.stop`
    pub random_admission_ratio_stop: f32,

    /// `<C>.victim.name` — name of another configured cache to use as victim.
    pub victim_name: Option<String>,

    /// `cache.write.rejection.threshold` — fraction of `max_size_bytes` at
    /// which `put` is rejected outright (§4.5).
    pub write_rejection_threshold: f32,
}

impl CacheConfig {
    /// Creates a configuration with the documented defaults for the given
    /// storage kind and name.
    #[must_use]
    pub fn new(name: impl Into<String>, storage: StorageKind) -> Self {
        let segment_size_bytes = match storage {
            StorageKind::OffHeap => 4 * 1024 * 1024,
            StorageKind::File => 256 * 1024 * 1024,
        };

        Self {
            name: name.into(),
            storage,
            segment_size_bytes,
            max_size_bytes: 0,
            data_dir: None,

            scavenger_start_ratio: 0.95,
            scavenger_stop_ratio: 0.90,
            dump_below_start: 0.10,
            dump_below_stop: 0.50,
            dump_below_step: 0.10,
            scavenger_run_interval_secs: 60,
            scavenger_max_segments_before_stall: 10,
            recycling_policy: RecyclingPolicy::MinAlive,

            num_ranks: 8,
            slru_num_segments: 8,
            slru_insert_point: 4,

            admission: AdmissionKind::Always,
            aq_start_size_ratio: 0.5,
            aq_min_size_ratio: 0.1,
            aq_max_size_ratio: 1.0,
            readmission_hit_count_min: 1,

            write_avg_rate_limit: 52_428_800,
            throughput_check_interval_secs: 3600,
            throughput_tolerance: 0.05,
            throughput_adjustment_steps: 10,
            writes_max_wait_time_ms: 10,

            index_slots_power: 10,
            index_data_embedded: false,
            index_data_embedded_size: 100,

            expire_start_bin_value: 60,
            expire_multiplier_value: 2,

            sparse_files_support: false,
            minimum_active_dataset_ratio: 0.9,
            storage_pool_size: 32,
            victim_promotion_on_hit: true,
            eviction_disabled_mode: false,
            prefetch_buffer_size: 4 * 1024 * 1024,
            block_writer_block_size: 4096,
            random_admission_ratio_start: 1.0,
            random_admission_ratio_stop: 0.0,

            victim_name: None,
            write_rejection_threshold: 0.98,
        }
    }

    /// Sets the data directory for a file-backed cache.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the target segment size in bytes.
    #[must_use]
    pub fn segment_size_bytes(mut self, bytes: u64) -> Self {
        self.segment_size_bytes = bytes;
        self
    }

    /// Sets the maximum cache size in bytes (0 = unlimited).
    #[must_use]
    pub fn max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Sets the admission policy.
    #[must_use]
    pub fn admission(mut self, admission: AdmissionKind) -> Self {
        self.admission = admission;
        self
    }

    /// Sets the name of the cache to use as a victim for this cache.
    #[must_use]
    pub fn victim_name(mut self, name: impl Into<String>) -> Self {
        self.victim_name = Some(name.into());
        self
    }

    /// Sets the index slot count as a power of two (`index.slots.power`).
    #[must_use]
    pub fn index_slots_power(mut self, power: u8) -> Self {
        self.index_slots_power = power;
        self
    }

    /// Returns the initial slot count (`2^index_slots_power`).
    #[must_use]
    pub fn initial_slot_count(&self) -> usize {
        1usize << self.index_slots_power
    }

    /// Validates invariants that are cheap to check at construction time and
    /// would otherwise surface confusingly deep inside the index/scavenger.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if a ratio is out of `[0, 1]`,
    /// `num_ranks` is zero, or `storage == File` without a `data_dir`.
    pub fn validate(&self) -> crate::Result<()> {
        let ratios = [
            ("scavenger.start.ratio", self.scavenger_start_ratio),
            ("scavenger.stop.ratio", self.scavenger_stop_ratio),
            ("scavenger.dump.entry.below.start", self.dump_below_start),
            ("scavenger.dump.entry.below.stop", self.dump_below_stop),
            (
                "cache.minimum.active.dataset.ratio",
                self.minimum_active_dataset_ratio,
            ),
            ("cache.write.rejection.threshold", self.write_rejection_threshold),
        ];

        for (key, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(crate::Error::InvalidConfig(format!(
                    "{key} must be in [0, 1], got {value}"
                )));
            }
        }

        if self.num_ranks == 0 {
            return Err(crate::Error::InvalidConfig(
                "cache.popularity.number.ranks must be > 0".into(),
            ));
        }

        if self.slru_insert_point >= self.slru_num_segments {
            return Err(crate::Error::InvalidConfig(format!(
                "eviction.slru.insert.point ({}) must be < eviction.slru.number.segments ({})",
                self.slru_insert_point, self.slru_num_segments
            )));
        }

        if self.storage == StorageKind::File && self.data_dir.is_none() {
            return Err(crate::Error::InvalidConfig(
                "data.dir.name is required for file-backed caches".into(),
            ));
        }

        Ok(())
    }
}

/// Top-level configuration for a set of named caches, analogous to
/// `caches.name.list` / `caches.types.list` in spec §6.
#[derive(Debug, Clone, Default)]
pub struct CarrotCacheConfig {
    /// Directory snapshots would be written to. Snapshot *persistence* is
    /// out of scope (spec §1); this is retained as a configuration value
    /// only so the forced-rehash-completion hook has somewhere to point.
    pub snapshot_dir: Option<PathBuf>,
    /// Per-cache configurations, keyed by `CacheConfig::name`.
    pub caches: Vec<CacheConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = CacheConfig::new("main", StorageKind::OffHeap);
        assert_eq!(cfg.segment_size_bytes, 4 * 1024 * 1024);
        assert_eq!(cfg.scavenger_start_ratio, 0.95);
        assert_eq!(cfg.scavenger_stop_ratio, 0.90);
        assert_eq!(cfg.num_ranks, 8);
        assert_eq!(cfg.slru_num_segments, 8);
        assert_eq!(cfg.slru_insert_point, 4);
        assert_eq!(cfg.write_avg_rate_limit, 52_428_800);
        assert_eq!(cfg.writes_max_wait_time_ms, 10);
        assert_eq!(cfg.initial_slot_count(), 1024);

        let file_cfg = CacheConfig::new("disk", StorageKind::File);
        assert_eq!(file_cfg.segment_size_bytes, 256 * 1024 * 1024);
    }

    #[test]
    fn validate_rejects_missing_data_dir_for_file_cache() {
        let cfg = CacheConfig::new("disk", StorageKind::File);
        assert!(cfg.validate().is_err());
        assert!(cfg.data_dir("/tmp/foo").validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_ratio() {
        let mut cfg = CacheConfig::new("main", StorageKind::OffHeap);
        cfg.scavenger_start_ratio = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_slru_insert_point() {
        let mut cfg = CacheConfig::new("main", StorageKind::OffHeap);
        cfg.slru_insert_point = cfg.slru_num_segments;
        assert!(cfg.validate().is_err());
    }
}
