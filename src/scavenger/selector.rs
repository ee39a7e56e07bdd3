// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Victim-segment selection strategies (spec §3, "Scavenger — victim
//! selection"), mirroring the teacher's `GcStrategy` pattern: a trait
//! picking segments out of everything currently sealed, swappable via
//! [`crate::config::RecyclingPolicy`].

use crate::segment::Segment;
use min_max_heap::MinMaxHeap;
use std::sync::Arc;

/// Picks which sealed segment(s) the Scavenger should reclaim next.
pub trait RecyclingSelector: Send + Sync {
    /// Returns the best next victim among `segments`, or `None` if none are
    /// worth reclaiming yet.
    fn select<'a>(&self, segments: &'a [Arc<Segment>]) -> Option<&'a Arc<Segment>>;
}

/// Picks the segment with the fewest live items, via a min-heap keyed on
/// `total_active_items()` so repeated calls over a large candidate set
/// don't re-scan linearly every time.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinAlive;

impl RecyclingSelector for MinAlive {
    fn select<'a>(&self, segments: &'a [Arc<Segment>]) -> Option<&'a Arc<Segment>> {
        let mut heap: MinMaxHeap<(u64, usize)> = MinMaxHeap::with_capacity(segments.len());
        for (idx, segment) in segments.iter().enumerate() {
            heap.push((segment.info().total_active_items(), idx));
        }
        let (_, idx) = heap.pop_min()?;
        segments.get(idx)
    }
}

/// Picks the oldest segment (by `creation_time`) regardless of occupancy.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lrc;

impl RecyclingSelector for Lrc {
    fn select<'a>(&self, segments: &'a [Arc<Segment>]) -> Option<&'a Arc<Segment>> {
        segments
            .iter()
            .min_by_key(|s| s.info().creation_time())
    }
}
