// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Cache-wide counters surfaced by [`crate::Cache::stats`] (spec §3, "Cache
//! Facade — stats").

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Total `get` calls.
    pub gets: u64,
    /// `get` calls that found a live value.
    pub hits: u64,
    /// Total `put` calls.
    pub writes: u64,
    /// `put` calls rejected (capacity, admission policy, or rehash overflow).
    pub rejected_writes: u64,
    /// Items found expired and evicted by `get`/`delete`/the Scavenger.
    pub expired_evictions: u64,
}

impl StatsSnapshot {
    /// Hit ratio in `[0, 1]`; `0.0` if there have been no `get` calls yet.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.hits as f64 / self.gets as f64
            }
        }
    }
}

/// Atomic counters updated by the Cache Facade on every operation.
#[derive(Debug, Default)]
pub struct CacheStats {
    gets: AtomicU64,
    hits: AtomicU64,
    writes: AtomicU64,
    rejected_writes: AtomicU64,
    expired_evictions: AtomicU64,
}

impl CacheStats {
    /// Records one `get` call.
    pub fn record_get(&self, hit: bool) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records one `put` call.
    pub fn record_write(&self, rejected: bool) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if rejected {
            self.rejected_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records one item found expired and evicted.
    pub fn record_expired_eviction(&self) {
        self.expired_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot of all counters (each loaded
    /// independently; a concurrent writer may land between two loads, which
    /// is acceptable for a stats surface).
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            rejected_writes: self.rejected_writes.load(Ordering::Relaxed),
            expired_evictions: self.expired_evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_ratio_tracks_gets_and_hits() {
        let stats = CacheStats::default();
        stats.record_get(true);
        stats.record_get(false);
        stats.record_get(true);

        let snap = stats.snapshot();
        assert_eq!(snap.gets, 3);
        assert_eq!(snap.hits, 2);
        assert!((snap.hit_ratio() - (2.0 / 3.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn hit_ratio_is_zero_with_no_gets() {
        assert_eq!(CacheStats::default().snapshot().hit_ratio(), 0.0);
    }

    #[test]
    fn rejected_writes_are_counted() {
        let stats = CacheStats::default();
        stats.record_write(false);
        stats.record_write(true);
        let snap = stats.snapshot();
        assert_eq!(snap.writes, 2);
        assert_eq!(snap.rejected_writes, 1);
    }
}
