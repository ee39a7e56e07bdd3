// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Memory Index: the in-RAM structure mapping a key's hash to where its
//! value lives, organized as slots of [`block::IndexBlock`]s under
//! Segmented-LRU popularity ordering (spec §3, "Memory Index").

pub mod block;
pub mod entry;
pub mod slot;
pub mod slru;

use crate::hash::hash64;
use crate::id::SegmentId;
use crate::value::{is_expired, ExpireAt};
use entry::{EntryLocation, MainEntry};
use slot::Slots;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of a [`MemoryIndex::find`] lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindResult {
    /// Key found and not expired.
    Found(MainEntry),
    /// Key found but past its expiration; caller should treat as a miss and
    /// may call [`MemoryIndex::delete`] to reclaim it opportunistically.
    Expired(MainEntry),
    /// Key not present.
    NotFound,
}

/// What the Scavenger should do with an entry found in a sealed segment
/// that's still referenced by the index, per spec §4.3's decision table
/// (`check_delete_for_scavenger(key, dump_below) -> {Ok, Deleted, Expired,
/// NotFound, ...}`, collapsed here to the two outcomes the Scavenger acts
/// on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScavengerDecision {
    /// The index entry is still live, points at this exact location, and
    /// its SLRU popularity is above `dump_below_ratio`: the scavenger must
    /// carry the item forward into a new segment.
    Keep,
    /// Safe to drop: the index has no entry for this hash, the entry
    /// points elsewhere (already overwritten, or expired and evicted), or
    /// it's live but too unpopular to bother carrying forward.
    Drop,
}

/// Outcome of [`MemoryIndex::aarp`]: atomic add-if-absent / remove-if-present
/// (spec §4.1), the primitive the Admission Queue's ghost cache is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AarpResult {
    /// The hash wasn't tracked; it now is (first sighting).
    Inserted,
    /// The hash was already tracked; it has been removed (second sighting —
    /// the caller should now admit the key for real).
    Deleted,
}

/// Threshold, expressed as entries-per-slot, above which [`MemoryIndex`]
/// starts doubling the slot count. Not a spec value; mirrors the usual
/// incremental-hash-table default of "rehash before the average bucket
/// exceeds ~1 entry."
const GROW_LOAD_FACTOR: f64 = 1.0;

/// The Memory Index: `insert`/`find`/`delete` plus the Scavenger-facing
/// `check_delete_for_scavenger` hook, backed by an incrementally-resizable
/// slot table.
pub struct MemoryIndex {
    slots: Slots,
    num_ranks: u8,
    slru_num_segments: u8,
    slru_insert_point: u8,
    /// Signed counter: `expired entries reclaimed - entries evicted while
    /// still live`. Exposed for the Throughput Controller / stats layer
    /// (SUPPLEMENT-EXPIRATION-BINNING).
    expired_evicted_balance: std::sync::atomic::AtomicI64,
}

impl MemoryIndex {
    /// Creates a new index with `initial_slots` slots (must be a power of
    /// two; round up if not).
    #[must_use]
    pub fn new(initial_slots: usize, num_ranks: u8, slru_num_segments: u8, slru_insert_point: u8) -> Self {
        Self {
            slots: Slots::new(initial_slots.next_power_of_two()),
            num_ranks,
            slru_num_segments,
            slru_insert_point,
            expired_evicted_balance: std::sync::atomic::AtomicI64::new(0),
        }
    }

    /// Number of distinct SLRU virtual segments configured.
    #[must_use]
    pub fn slru_num_segments(&self) -> u8 {
        self.slru_num_segments
    }

    /// Number of popularity ranks configured (spec §7 `Rank`).
    #[must_use]
    pub fn num_ranks(&self) -> u8 {
        self.num_ranks
    }

    /// Current `expired_evicted_balance` counter value.
    #[must_use]
    pub fn expired_evicted_balance(&self) -> i64 {
        self.expired_evicted_balance.load(Ordering::Relaxed)
    }

    fn maybe_grow(&self) {
        let slots = self.slots.len();
        if self.slots.is_rehashing() {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let load = self.slots.entry_count() as f64 / slots as f64;
        if load > GROW_LOAD_FACTOR {
            self.slots.start_rehash(slots * 2);
        }
    }

    /// Looks up `key`, promoting it one SLRU segment on a live hit.
    pub fn find(&self, key: &[u8], now: ExpireAt) -> FindResult {
        let hash = hash64(key);
        self.slots.with_block(hash, |block| match block.find(hash).cloned() {
            None => FindResult::NotFound,
            Some(entry) if is_expired(entry.expire, now) => FindResult::Expired(entry),
            Some(entry) => {
                slru::promote_on_hit(block, hash);
                FindResult::Found(entry)
            }
        })
    }

    /// Inserts or overwrites the entry for `key`, placing it at the
    /// configured SLRU insert point.
    ///
    /// Returns `false` if the underlying block could not make room even
    /// after growing along the block-size ladder and evicting its coldest
    /// entry (spec §4.1 overflow resolution) — the caller should treat
    /// this as a write rejection.
    pub fn insert(
        &self,
        key: &[u8],
        expire: ExpireAt,
        location: EntryLocation,
    ) -> bool {
        let hash = hash64(key);
        self.maybe_grow();

        let entry = MainEntry {
            hash,
            expire,
            hit_count: 0,
            segment: self.slru_insert_point,
            location,
        };

        self.slots.with_block(hash, |block| {
            block.remove(hash);
            !matches!(
                slru::insert_new(block, entry, self.slru_insert_point),
                block::InsertOutcome::Failed
            )
        })
    }

    /// Like [`Self::insert`], but also returns any entry evicted from the
    /// block's tail to make room (spec §3, "Cache Facade — victim cache":
    /// a tail eviction that happens while the entry is still live is a
    /// candidate for handoff to a victim cache, rather than being dropped
    /// outright). Returns `(admitted, evicted)`.
    pub fn insert_evicting(
        &self,
        key: &[u8],
        expire: ExpireAt,
        location: EntryLocation,
    ) -> (bool, Option<MainEntry>) {
        let hash = hash64(key);
        self.maybe_grow();

        let entry = MainEntry {
            hash,
            expire,
            hit_count: 0,
            segment: self.slru_insert_point,
            location,
        };

        self.slots.with_block(hash, |block| {
            block.remove(hash);
            match slru::insert_new(block, entry, self.slru_insert_point) {
                block::InsertOutcome::Failed => (false, None),
                block::InsertOutcome::EvictedTail(evicted) => (true, Some(evicted)),
                block::InsertOutcome::Inserted | block::InsertOutcome::Grown => (true, None),
            }
        })
    }

    /// Removes the entry for `key`, if present.
    pub fn delete(&self, key: &[u8]) -> Option<MainEntry> {
        self.delete_by_hash(hash64(key))
    }

    pub(crate) fn delete_by_hash(&self, hash: u64) -> Option<MainEntry> {
        self.slots.with_block(hash, |block| block.remove(hash))
    }

    /// Atomic add-if-absent / remove-if-present over `key`'s hash alone
    /// (spec §4.1 `aarp`), used by the Admission Queue's ghost cache: a
    /// hash not yet tracked is recorded (`Inserted`); a hash already
    /// tracked is forgotten (`Deleted`), signaling the caller should admit
    /// the key for real on this, its second sighting. Stores only the
    /// hash (spec §3, "Admission-Queue variant"), never key bytes.
    pub fn aarp(&self, key: &[u8]) -> AarpResult {
        let hash = hash64(key);
        self.maybe_grow();

        let existing = self.slots.with_block(hash, |block| block.remove(hash));
        if existing.is_some() {
            return AarpResult::Deleted;
        }

        let entry = MainEntry {
            hash,
            expire: crate::value::NO_EXPIRY,
            hit_count: 0,
            segment: self.slru_insert_point,
            location: EntryLocation::Segment {
                segment_id: 0,
                offset: 0,
                value_size: 0,
            },
        };
        self.slots.with_block(hash, |block| {
            let _ = slru::insert_new(block, entry, self.slru_insert_point);
        });
        AarpResult::Inserted
    }

    /// Scavenger hook: given the index's current entry for a hash found in
    /// a sealed segment, decide whether to carry it forward. `found_at`
    /// identifies the exact `(segment, offset)` the scavenger is scanning;
    /// if the index's own entry for this hash no longer points there (it
    /// was overwritten or expired), the segment's copy is stale.
    /// `dump_below_ratio` is the Scavenger's current popularity-drop
    /// threshold (spec §4.3): a live, correctly-located entry whose
    /// position in its block puts it at or below that popularity is
    /// dropped rather than carried forward.
    pub fn check_delete_for_scavenger(
        &self,
        hash: u64,
        found_at: (SegmentId, u64),
        now: ExpireAt,
        dump_below_ratio: f32,
    ) -> ScavengerDecision {
        let decision = self.slots.with_block(hash, |block| match block.position_of(hash) {
            None => ScavengerDecision::Drop,
            Some(position) => {
                let entry = block.find(hash).expect("position_of implies find");
                if is_expired(entry.expire, now) {
                    return ScavengerDecision::Drop;
                }
                match &entry.location {
                    EntryLocation::Segment { segment_id, offset, .. }
                        if (*segment_id, *offset) == found_at =>
                    {
                        if slru::should_dump(position, block.len(), dump_below_ratio) {
                            ScavengerDecision::Drop
                        } else {
                            ScavengerDecision::Keep
                        }
                    }
                    _ => ScavengerDecision::Drop,
                }
            }
        });

        if decision == ScavengerDecision::Drop {
            self.expired_evicted_balance.fetch_add(1, Ordering::Relaxed);
        }

        decision
    }

    /// Relocates a still-live entry to a new `(segment, offset)` after the
    /// Scavenger copies it forward into a fresh segment.
    pub fn relocate(&self, hash: u64, new_segment_id: SegmentId, new_offset: u64) {
        self.slots.with_block(hash, |block| {
            if let Some(mut entry) = block.remove(hash) {
                if let EntryLocation::Segment { segment_id, offset, .. } = &mut entry.location {
                    *segment_id = new_segment_id;
                    *offset = new_offset;
                }
                let head = block.segment_head(entry.segment);
                block.insert_at(head, entry);
            }
        });
    }

    /// Total number of entries across the live table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.entry_count()
    }

    /// `true` if the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forces any in-progress incremental rehash to completion. Exposed
    /// for callers (e.g. a graceful-shutdown path) that need a
    /// single-generation table, since rehashing is otherwise piggybacked
    /// on ordinary operations and may never finish under light load.
    pub fn complete_rehashing(&self) {
        self.slots.complete_rehashing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> MemoryIndex {
        MemoryIndex::new(8, 8, 8, 4)
    }

    fn loc(segment_id: SegmentId, offset: u64) -> EntryLocation {
        EntryLocation::Segment {
            segment_id,
            offset,
            value_size: 10,
        }
    }

    #[test]
    fn insert_then_find_round_trips() {
        let idx = index();
        assert!(idx.insert(b"key", 0, loc(1, 100)));

        match idx.find(b"key", 0) {
            FindResult::Found(entry) => assert_eq!(entry.segment, 4),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn repeated_hits_promote_toward_segment_one() {
        let idx = index();
        idx.insert(b"key", 0, loc(1, 100));

        for _ in 0..5 {
            idx.find(b"key", 0);
        }

        match idx.find(b"key", 0) {
            FindResult::Found(entry) => assert_eq!(entry.segment, 1),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn expired_entry_is_reported_as_expired_not_missing() {
        let idx = index();
        idx.insert(b"key", 50, loc(1, 100));

        match idx.find(b"key", 100) {
            FindResult::Expired(_) => {}
            other => panic!("expected Expired, got {other:?}"),
        }
    }

    #[test]
    fn delete_removes_entry() {
        let idx = index();
        idx.insert(b"key", 0, loc(1, 100));
        assert!(idx.delete(b"key").is_some());
        assert_eq!(idx.find(b"key", 0), FindResult::NotFound);
    }

    #[test]
    fn scavenger_keeps_entries_still_pointing_at_scanned_location() {
        let idx = index();
        idx.insert(b"key", 0, loc(1, 100));
        let hash = hash64(b"key");

        assert_eq!(
            idx.check_delete_for_scavenger(hash, (1, 100), 0, 0.0),
            ScavengerDecision::Keep
        );
    }

    #[test]
    fn scavenger_drops_entries_overwritten_elsewhere() {
        let idx = index();
        idx.insert(b"key", 0, loc(2, 200));
        let hash = hash64(b"key");

        // Scanning a stale copy still at (1, 100): the live entry has
        // since moved to (2, 200), so the stale copy should be dropped.
        assert_eq!(
            idx.check_delete_for_scavenger(hash, (1, 100), 0, 0.0),
            ScavengerDecision::Drop
        );
    }

    #[test]
    fn scavenger_drops_the_coldest_colliding_entry_below_threshold() {
        let idx = MemoryIndex::new(1024, 8, 8, 4);
        let mask = 1024usize - 1;

        // Every insert lands at the same SLRU insert point, so it's always
        // placed at the block's head; gather enough same-slot keys that
        // the first one inserted gets pushed all the way to the tail.
        let first_key = 0u64.to_be_bytes();
        let target_slot = (hash64(&first_key) as usize) & mask;
        let mut colliding_keys = vec![first_key.to_vec()];
        let mut counter = 1u64;
        while colliding_keys.len() < 4 {
            let key = counter.to_be_bytes().to_vec();
            if (hash64(&key) as usize) & mask == target_slot {
                colliding_keys.push(key);
            }
            counter += 1;
        }

        for (i, key) in colliding_keys.iter().enumerate() {
            idx.insert(key, 0, loc(1, 100 + i as u64));
        }

        let coldest_hash = hash64(&colliding_keys[0]);
        let hottest_idx = colliding_keys.len() - 1;
        let hottest_hash = hash64(&colliding_keys[hottest_idx]);

        assert_eq!(
            idx.check_delete_for_scavenger(coldest_hash, (1, 100), 0, 0.5),
            ScavengerDecision::Drop
        );
        assert_eq!(
            idx.check_delete_for_scavenger(hottest_hash, (1, 100 + hottest_idx as u64), 0, 0.5),
            ScavengerDecision::Keep
        );
    }

    #[test]
    fn scavenger_keeps_popular_entries_under_a_lenient_threshold() {
        let idx = index();
        idx.insert(b"key", 0, loc(1, 100));
        let hash = hash64(b"key");

        // dump_below_ratio of 0.0 never dumps on popularity alone.
        assert_eq!(
            idx.check_delete_for_scavenger(hash, (1, 100), 0, 0.0),
            ScavengerDecision::Keep
        );
    }

    #[test]
    fn aarp_toggles_inserted_then_deleted() {
        let idx = index();
        assert_eq!(idx.aarp(b"key"), AarpResult::Inserted);
        assert_eq!(idx.aarp(b"key"), AarpResult::Deleted);
        // forgotten after the toggle back off
        assert_eq!(idx.aarp(b"key"), AarpResult::Inserted);
    }

    #[test]
    fn insert_evicting_reports_no_eviction_under_ordinary_load() {
        // With the incremental-grow machinery keeping pace, ordinary,
        // well-distributed inserts don't force a block past its ladder's
        // largest class; block-level eviction itself is covered directly
        // against `IndexBlock` (see `block::tests::grows_along_ladder_when_full`).
        let idx = index();
        let (admitted, evicted) = idx.insert_evicting(b"key", 0, loc(1, 100));
        assert!(admitted);
        assert!(evicted.is_none());
    }

    #[test]
    fn insert_grows_slot_table_under_load() {
        let idx = index();
        for i in 0..64u64 {
            idx.insert(&i.to_be_bytes(), 0, loc(1, i));
        }
        idx.complete_rehashing();
        assert!(idx.len() >= 64);
        for i in 0..64u64 {
            assert_ne!(idx.find(&i.to_be_bytes(), 0), FindResult::NotFound);
        }
    }
}
