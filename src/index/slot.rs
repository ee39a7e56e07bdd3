// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Incremental-rehash slot storage: a dual slot-array (`A`/`B`) that grows
//! or shrinks the Memory Index's slot count without a stop-the-world pass,
//! piggybacking migration work on ordinary `insert`/`find` calls the way
//! `HashMap`-style incremental rehashers do (spec §4.1, Open Question:
//! "incremental rehashing protocol").
//!
//! Concurrency is striped over a fixed pool of locks rather than one lock
//! per slot, bounding lock memory independent of the (resizable) slot
//! count. `1117` is prime, which spreads adjacent slot indices (as produced
//! by linear migration) across distinct stripes.

use super::block::IndexBlock;
use parking_lot::{Mutex, MutexGuard};

const NUM_STRIPES: usize = 1117;

struct LockPool {
    stripes: Vec<Mutex<()>>,
}

impl LockPool {
    fn new() -> Self {
        Self {
            stripes: (0..NUM_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn guard(&self, slot: usize) -> MutexGuard<'_, ()> {
        self.stripes[slot % NUM_STRIPES].lock()
    }
}

/// A single generation of slots: a flat, power-of-two-sized array of blocks.
struct SlotArray {
    blocks: Vec<Mutex<IndexBlock>>,
}

impl SlotArray {
    fn new(len: usize) -> Self {
        debug_assert!(len.is_power_of_two());
        Self {
            blocks: (0..len).map(|_| Mutex::new(IndexBlock::new())).collect(),
        }
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn slot_for(&self, hash: u64) -> usize {
        (hash as usize) & (self.len() - 1)
    }
}

/// How many entries [`Slots::migrate_step`] moves per call. Chosen to bound
/// the pause a single `put`/`get` can incur while piggybacking migration
/// work, not derived from any spec value.
const MIGRATE_BATCH: usize = 1;

/// Dual slot-array with incremental migration state.
pub struct Slots {
    pool: LockPool,
    a: Mutex<std::sync::Arc<SlotArray>>,
    b: Mutex<Option<std::sync::Arc<SlotArray>>>,
    /// Number of slots in `a` already migrated into `b`.
    migrated: std::sync::atomic::AtomicUsize,
}

impl Slots {
    /// Creates a table with the given initial slot count.
    #[must_use]
    pub fn new(initial_slots: usize) -> Self {
        Self {
            pool: LockPool::new(),
            a: Mutex::new(std::sync::Arc::new(SlotArray::new(initial_slots.max(1)))),
            b: Mutex::new(None),
            migrated: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// `true` if a rehash is in progress.
    #[must_use]
    pub fn is_rehashing(&self) -> bool {
        self.b.lock().is_some()
    }

    /// Begins migrating to a table of `new_len` slots. A no-op if a rehash
    /// is already underway.
    pub fn start_rehash(&self, new_len: usize) {
        let mut b = self.b.lock();
        if b.is_some() {
            return;
        }
        *b = Some(std::sync::Arc::new(SlotArray::new(new_len.max(1))));
        self.migrated.store(0, std::sync::atomic::Ordering::SeqCst);
    }

    /// Moves up to [`MIGRATE_BATCH`] slots from `a` into `b`, completing
    /// the rehash (swapping `b` into `a`) once every slot has moved.
    /// Called opportunistically from `insert`/`find`/`remove` so no
    /// dedicated background thread is required, and also exposed for the
    /// Memory Index's forced-completion path (e.g. ahead of a snapshot).
    pub fn migrate_step(&self) {
        let Some(b) = self.b.lock().clone() else {
            return;
        };
        let a = self.a.lock().clone();

        let idx = self.migrated.load(std::sync::atomic::Ordering::SeqCst);
        if idx >= a.len() {
            self.complete_rehash(&a, &b);
            return;
        }

        for slot in idx..(idx + MIGRATE_BATCH).min(a.len()) {
            let _guard = self.pool.guard(slot);
            let mut src = a.blocks[slot].lock();
            let hashes: Vec<u64> = src.iter().map(|e| e.hash).collect();
            for hash in hashes {
                if let Some(entry) = src.remove(hash) {
                    let dst_slot = b.slot_for(hash);
                    let _dst_guard = self.pool.guard(dst_slot);
                    b.blocks[dst_slot].lock().insert_at(0, entry);
                }
            }
        }

        self.migrated
            .fetch_add(MIGRATE_BATCH, std::sync::atomic::Ordering::SeqCst);

        if idx + MIGRATE_BATCH >= a.len() {
            self.complete_rehash(&a, &b);
        }
    }

    fn complete_rehash(&self, a: &std::sync::Arc<SlotArray>, b: &std::sync::Arc<SlotArray>) {
        let mut a_slot = self.a.lock();
        // Only the thread that observes the fully-migrated state performs
        // the swap; a racing thread sees `b` already cleared and returns.
        if !std::sync::Arc::ptr_eq(a, &a_slot) {
            return;
        }
        *a_slot = b.clone();
        *self.b.lock() = None;
        self.migrated.store(0, std::sync::atomic::Ordering::SeqCst);
    }

    /// Forces any in-progress rehash to completion immediately, draining
    /// all remaining slots. Used ahead of operations that need a single,
    /// stable table (e.g. a full iteration for the scavenger).
    pub fn complete_rehashing(&self) {
        while self.is_rehashing() {
            self.migrate_step();
        }
    }

    /// Resolves `hash` to the table/slot that currently owns it, migrating
    /// one batch first so the two-phase lookup below stays bounded: if a
    /// slot in `a` has already been migrated (`slot < migrated`), the
    /// entry — if any — now lives in `b`; otherwise it's still in `a`.
    fn locate(&self, hash: u64) -> (std::sync::Arc<SlotArray>, usize) {
        let b = self.b.lock().clone();
        let a = self.a.lock().clone();

        if let Some(b) = b {
            let a_slot = a.slot_for(hash);
            let migrated = self.migrated.load(std::sync::atomic::Ordering::SeqCst);
            if a_slot < migrated {
                return (b.clone(), b.slot_for(hash));
            }
        }

        let a_slot = a.slot_for(hash);
        (a, a_slot)
    }

    /// Runs `f` with exclusive access to the block currently responsible
    /// for `hash`, piggybacking one migration step first.
    pub fn with_block<R>(&self, hash: u64, f: impl FnOnce(&mut IndexBlock) -> R) -> R {
        self.migrate_step();
        let (table, slot) = self.locate(hash);
        let _guard = self.pool.guard(slot);
        let mut block = table.blocks[slot].lock();
        f(&mut block)
    }

    /// Current slot count of the live (pre-migration-target) table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.a.lock().len()
    }

    /// Total number of entries across every slot of the live table. Used
    /// for load-factor-triggered resize decisions.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        let a = self.a.lock().clone();
        a.blocks.iter().map(|b| b.lock().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::entry::{EntryLocation, MainEntry};

    fn entry(hash: u64) -> MainEntry {
        MainEntry {
            hash,
            expire: 0,
            hit_count: 0,
            segment: 1,
            location: EntryLocation::Segment {
                segment_id: 0,
                offset: 0,
                value_size: 1,
            },
        }
    }

    #[test]
    fn insert_and_find_without_rehash() {
        let slots = Slots::new(8);
        slots.with_block(42, |b| {
            b.insert_at(0, entry(42));
        });
        let found = slots.with_block(42, |b| b.find(42).cloned());
        assert!(found.is_some());
    }

    #[test]
    fn rehash_preserves_all_entries() {
        let slots = Slots::new(4);
        for hash in 0..20u64 {
            slots.with_block(hash, |b| {
                b.insert_at(0, entry(hash));
            });
        }
        assert_eq!(slots.entry_count(), 20);

        slots.start_rehash(16);
        assert!(slots.is_rehashing());
        slots.complete_rehashing();
        assert!(!slots.is_rehashing());

        assert_eq!(slots.entry_count(), 20);
        assert_eq!(slots.len(), 16);
        for hash in 0..20u64 {
            let found = slots.with_block(hash, |b| b.find(hash).cloned());
            assert!(found.is_some(), "missing hash {hash} after rehash");
        }
    }

    #[test]
    fn lookups_during_rehash_still_find_entries() {
        let slots = Slots::new(4);
        for hash in 0..20u64 {
            slots.with_block(hash, |b| {
                b.insert_at(0, entry(hash));
            });
        }

        slots.start_rehash(32);
        // Drive a few migration steps without forcing full completion.
        for _ in 0..5 {
            slots.migrate_step();
        }

        for hash in 0..20u64 {
            let found = slots.with_block(hash, |b| b.find(hash).cloned());
            assert!(found.is_some(), "missing hash {hash} mid-rehash");
        }
    }
}
