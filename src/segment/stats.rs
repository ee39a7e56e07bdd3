// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Runtime (non-persisted) segment statistics the Scavenger reads to pick
//! victims: how many of a segment's items are still reachable from the
//! Memory Index.

use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks liveness of a segment's items as the Memory Index invalidates
/// them (overwrite, delete, expiry) out from under a sealed segment.
#[derive(Debug, Default)]
pub struct GcStats {
    dead_items: AtomicU64,
    dead_bytes: AtomicU64,
}

impl GcStats {
    /// Records that one more item (of `bytes` size) is no longer reachable.
    pub fn mark_dead(&self, bytes: u64) {
        self.dead_items.fetch_add(1, Ordering::Release);
        self.dead_bytes.fetch_add(bytes, Ordering::Release);
    }

    /// Marks the whole segment dead at once (used when a victim is fully
    /// dropped rather than scanned item-by-item).
    pub fn mark_all_dead(&self, item_count: u64, total_bytes: u64) {
        self.dead_items.store(item_count, Ordering::Release);
        self.dead_bytes.store(total_bytes, Ordering::Release);
    }

    /// Number of items known dead.
    #[must_use]
    pub fn dead_items(&self) -> u64 {
        self.dead_items.load(Ordering::Acquire)
    }

    /// Number of bytes known dead.
    #[must_use]
    pub fn dead_bytes(&self) -> u64 {
        self.dead_bytes.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_dead_items_and_bytes() {
        let stats = GcStats::default();
        stats.mark_dead(100);
        stats.mark_dead(50);
        assert_eq!(stats.dead_items(), 2);
        assert_eq!(stats.dead_bytes(), 150);
    }
}
