// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Segmented-LRU helpers operating on an [`IndexBlock`]'s entry order.
//!
//! Virtual segments are numbered `1..=num_segments`, 1 being hottest.
//! Within a block, entries are kept sorted ascending by segment, and
//! MRU-first inside a segment's contiguous range — so the coldest entry in
//! the whole block is always the last element (spec §3, SLRU Classification).

use super::block::{IndexBlock, InsertOutcome};
use super::entry::MainEntry;

/// Promotes the entry at `hash`, if present, one segment toward the
/// hottest end (never past segment 1). Returns `true` if an entry was
/// found and promoted.
///
/// Per spec §4.1: "a hit promotes the entry to `max(1, currentSegment - 1)`."
pub fn promote_on_hit(block: &mut IndexBlock, hash: u64) -> bool {
    let Some(entry) = block.find(hash) else {
        return false;
    };
    let current = entry.segment;
    let target = current.saturating_sub(1).max(1);

    if target == current {
        return true;
    }

    let pos = block
        .iter()
        .position(|e| e.hash == hash)
        .expect("entry located by find() must have a matching position");
    block.move_to_segment(pos, target);
    true
}

/// Inserts a newly-admitted entry at the head of `insert_point`'s segment
/// range (spec §6: `eviction.slru.insert.point`), following the block's
/// overflow-resolution algorithm.
pub fn insert_new(block: &mut IndexBlock, mut entry: MainEntry, insert_point: u8) -> InsertOutcome {
    entry.segment = insert_point;
    let head = block.segment_head(insert_point);
    block.insert_at(head, entry)
}

/// Popularity of the entry at `position` out of `num_entries`, per the
/// dump-below-ratio formula: `(num_entries - position) / num_entries`.
/// Position `0` (hottest) scores `1.0`; the last position scores the
/// lowest non-zero value.
#[must_use]
pub fn popularity_ratio(position: usize, num_entries: usize) -> f32 {
    if num_entries == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        (num_entries - position) as f32 / num_entries as f32
    }
}

/// Returns `true` if the entry at `position` (out of `num_entries` total)
/// should be dropped rather than carried over during a scavenger scan,
/// given the current dump-below ratio.
#[must_use]
pub fn should_dump(position: usize, num_entries: usize, dump_below_ratio: f32) -> bool {
    popularity_ratio(position, num_entries) < dump_below_ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::entry::EntryLocation;

    fn entry(hash: u64, segment: u8) -> MainEntry {
        MainEntry {
            hash,
            expire: 0,
            hit_count: 0,
            segment,
            location: EntryLocation::Segment {
                segment_id: 1,
                offset: 0,
                value_size: 10,
            },
        }
    }

    #[test]
    fn promote_moves_toward_hottest() {
        let mut block = IndexBlock::new();
        block.insert_at(0, entry(1, 5));

        assert!(promote_on_hit(&mut block, 1));
        assert_eq!(block.find(1).unwrap().segment, 4);
    }

    #[test]
    fn promote_never_goes_below_one() {
        let mut block = IndexBlock::new();
        block.insert_at(0, entry(1, 1));

        assert!(promote_on_hit(&mut block, 1));
        assert_eq!(block.find(1).unwrap().segment, 1);
    }

    #[test]
    fn promote_on_missing_hash_is_noop() {
        let mut block = IndexBlock::new();
        assert!(!promote_on_hit(&mut block, 42));
    }

    #[test]
    fn insert_new_places_at_insert_point() {
        let mut block = IndexBlock::new();
        insert_new(&mut block, entry(1, 0), 4);
        assert_eq!(block.find(1).unwrap().segment, 4);
    }

    #[test]
    fn popularity_ratio_monotonic() {
        assert_eq!(popularity_ratio(0, 4), 1.0);
        assert!(popularity_ratio(3, 4) < popularity_ratio(0, 4));
        assert_eq!(popularity_ratio(0, 0), 0.0);
    }

    #[test]
    fn should_dump_respects_threshold() {
        assert!(should_dump(3, 4, 0.5));
        assert!(!should_dump(0, 4, 0.5));
    }
}
