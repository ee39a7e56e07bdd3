// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Admission policies gating `put` (spec §3, "Cache Facade — admission").
//! Built-ins are closed enums dispatched by [`crate::config::AdmissionKind`]
//! rather than reflection on a class name string (Design Note); a
//! [`Custom`] escape hatch covers anything else.

use crate::hash::hash64;
use crate::index::{AarpResult, MemoryIndex};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Decides whether a non-forced `put` should be admitted into the Main
/// Queue at all.
pub trait AdmissionPolicy: Send + Sync {
    /// Returns `true` if `key` should be admitted.
    fn admit(&self, key: &[u8]) -> bool;

    /// Records that `key` was, in fact, admitted (most policies use this to
    /// update their own state; [`AlwaysAdmit`] ignores it).
    fn record_admitted(&self, _key: &[u8]) {}
}

/// Admits everything unconditionally.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAdmit;

impl AdmissionPolicy for AlwaysAdmit {
    fn admit(&self, _key: &[u8]) -> bool {
        true
    }
}

/// Ghost cache: a bounded FIFO of recently-seen key hashes. A key is only
/// admitted to the real cache the *second* time it's seen — the Admission
/// Queue's job is purely to absorb scan-resistant one-hit-wonders. The
/// presence test-and-toggle itself is the Memory Index's `aarp` primitive
/// (spec §4.1); the FIFO on top bounds how many hashes it remembers, since
/// `aarp` alone has no notion of a queue size.
pub struct AdmissionQueue {
    index: MemoryIndex,
    order: Mutex<VecDeque<u64>>,
    capacity: AtomicUsize,
}

impl AdmissionQueue {
    /// Creates a queue holding up to `capacity` distinct key hashes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            index: MemoryIndex::new(capacity.next_power_of_two(), 1, 1, 0),
            order: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: AtomicUsize::new(capacity),
        }
    }

    /// Current capacity (`admission.queue.*.size` family).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Resizes the queue's capacity, dropping the oldest tracked hashes
    /// immediately if the new capacity is smaller. Driven by the
    /// Throughput Controller (spec §4.4, dial (a): "admission-queue size").
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        self.capacity.store(capacity, Ordering::Relaxed);
        let mut order = self.order.lock();
        while order.len() > capacity {
            if let Some(oldest) = order.pop_front() {
                self.index.delete_by_hash(oldest);
            }
        }
    }
}

impl AdmissionPolicy for AdmissionQueue {
    fn admit(&self, key: &[u8]) -> bool {
        match self.index.aarp(key) {
            AarpResult::Deleted => true,
            AarpResult::Inserted => {
                let mut order = self.order.lock();
                order.push_back(hash64(key));
                if order.len() > self.capacity() {
                    if let Some(oldest) = order.pop_front() {
                        self.index.delete_by_hash(oldest);
                    }
                }
                false
            }
        }
    }
}

/// Admits a random fraction of writes, linearly ramped between
/// `start`/`stop` by the Throughput Controller as pressure changes.
pub struct RandomRatio {
    ratio_bits: AtomicU32,
}

impl RandomRatio {
    /// Creates a policy with the given initial admission ratio in `[0, 1]`.
    #[must_use]
    pub fn new(initial_ratio: f32) -> Self {
        Self {
            ratio_bits: AtomicU32::new(initial_ratio.clamp(0.0, 1.0).to_bits()),
        }
    }

    /// Current admission ratio.
    #[must_use]
    pub fn ratio(&self) -> f32 {
        f32::from_bits(self.ratio_bits.load(Ordering::Relaxed))
    }

    /// Updates the admission ratio (called by the Throughput Controller).
    pub fn set_ratio(&self, ratio: f32) {
        self.ratio_bits
            .store(ratio.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

impl AdmissionPolicy for RandomRatio {
    fn admit(&self, key: &[u8]) -> bool {
        // Deterministic pseudo-randomness keyed off the item's own hash
        // rather than a global RNG, so admission decisions are reproducible
        // in tests without threading a `rand::Rng` through every call site.
        let h = hash64(key);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (h % 1_000_000) as f32 / 1_000_000.0;
        normalized < self.ratio()
    }
}

/// User-supplied admission policy, for anything the built-ins don't cover.
pub struct Custom(pub Arc<dyn AdmissionPolicy>);

impl AdmissionPolicy for Custom {
    fn admit(&self, key: &[u8]) -> bool {
        self.0.admit(key)
    }

    fn record_admitted(&self, key: &[u8]) {
        self.0.record_admitted(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_admit_admits_everything() {
        assert!(AlwaysAdmit.admit(b"anything"));
    }

    #[test]
    fn admission_queue_requires_a_second_sighting() {
        let aq = AdmissionQueue::new(16);
        assert!(!aq.admit(b"key"));
        assert!(aq.admit(b"key"));
    }

    #[test]
    fn admission_queue_evicts_oldest_past_capacity() {
        let aq = AdmissionQueue::new(2);
        assert!(!aq.admit(b"a"));
        assert!(!aq.admit(b"b"));
        assert!(!aq.admit(b"c")); // evicts "a"
        assert!(!aq.admit(b"a")); // forgotten, treated as new again
    }

    #[test]
    fn random_ratio_respects_extremes() {
        let never = RandomRatio::new(0.0);
        let always = RandomRatio::new(1.0);
        for i in 0..100u32 {
            let key = i.to_be_bytes();
            assert!(!never.admit(&key));
            assert!(always.admit(&key));
        }
    }
}
