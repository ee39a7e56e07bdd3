// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A multi-tier, scan-resistant key/value cache.
//!
//! Cached items are written into append-only [`Segment`]s, indexed in RAM by
//! a striped, incrementally-resizable [`MemoryIndex`] using Segmented-LRU
//! popularity ordering to resist one-shot scans. A background [`Scavenger`]
//! recycles the least-valuable sealed segments, carrying forward items still
//! referenced by the index and dropping everything else. An
//! [`admission::AdmissionPolicy`] decides what's worth caching in the first
//! place, a [`throughput::ThroughputController`] watches the measured write
//! rate against a configured budget, and a cache can hand items it evicts
//! down to another configured cache acting as its victim.
//!
//! # Example
//!
//! ```
//! use carrot_cache::{Cache, CacheConfig, StorageKind};
//!
//! # fn main() -> carrot_cache::Result<()> {
//! let cache = Cache::new(CacheConfig::new("main", StorageKind::OffHeap))?;
//!
//! cache.put(b"hello", b"world", carrot_cache::NO_EXPIRY)?;
//!
//! let mut buf = [0u8; 16];
//! assert!(matches!(cache.get(b"hello", &mut buf)?, carrot_cache::GetOutcome::Found(_)));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]

mod admission;
mod cache;
mod clock;
mod coding;
mod config;
mod error;
mod hash;
mod id;
mod index;
mod rank;
mod scavenger;
mod scheduler;
mod segment;
mod slice;
mod stats;
mod storage;
mod throughput;
mod value;
mod victim;

pub use {
    admission::{AdmissionPolicy, AdmissionQueue, AlwaysAdmit, Custom as CustomAdmission, RandomRatio},
    cache::{build_caches, Cache},
    clock::{Clock, SystemClock, VirtualClock},
    config::{AdmissionKind, CacheConfig, CarrotCacheConfig, RecyclingPolicy, StorageKind},
    error::{Error, GetOutcome, PutOutcome, Result},
    rank::Rank,
    scavenger::{selector::RecyclingSelector, GcReport, Scavenger},
    slice::Slice,
    stats::StatsSnapshot,
    storage::{StorageEngine, StoragePool},
    throughput::ThroughputController,
    value::{expire_bin_index, ExpireAt, UserKey, UserValue, NO_EXPIRY},
    victim::VictimSink,
};

#[doc(hidden)]
pub use {index::MemoryIndex, segment::Segment};
