// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Throughput Controller: measures recent write bytes/sec against
//! `cache.write.avg.rate.limit` and nudges one of two dials up or down on a
//! `throughput.check.interval.sec` tick (spec §4.4): the Admission Queue's
//! size, when the cache admits through it, or otherwise the Scavenger's
//! dump-below ratio. Advisory only — it never blocks a writer itself;
//! callers observing sustained pressure apply `cache.writes.max.wait.time.ms`
//! backoff on their own.

use crate::admission::AdmissionQueue;
use crate::config::CacheConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The Scavenger's dump-below ratio, as seen by the Throughput Controller.
/// Implemented by [`crate::scavenger::Scavenger`]; kept as a trait so this
/// module doesn't need to know `Scavenger`'s storage-engine type parameter.
pub trait DumpBelowRatio: Send + Sync {
    /// Current dump-below ratio.
    fn dump_below_ratio(&self) -> f32;
    /// Sets the dump-below ratio, clamped to the scavenger's own configured
    /// `start..stop` span.
    fn set_dump_below_ratio(&self, ratio: f32);
}

/// Which of spec §4.4's two named dials a [`ThroughputController`] drives.
pub enum ThroughputDial {
    /// Admission-Queue-based admission (`AdmissionKind::AdmissionQueue`):
    /// steps the queue's tracked-hash capacity between `min_size` and
    /// `max_size` (`admission.queue.min.size` / `admission.queue.max.size`).
    AdmissionQueueSize {
        queue: Arc<AdmissionQueue>,
        min_size: usize,
        max_size: usize,
    },
    /// Any other admission policy: steps the Scavenger's dump-below ratio
    /// instead.
    ScavengerDumpBelow(Arc<dyn DumpBelowRatio>),
}

enum StepDirection {
    Tighten,
    Relax,
}

/// Tracks bytes written since the last tick and steps its configured
/// [`ThroughputDial`] to bring the measured rate back within tolerance of
/// `cache.write.avg.rate.limit`.
pub struct ThroughputController {
    limit_bytes_per_sec: u64,
    tolerance: f32,
    adjustment_steps: u32,
    check_interval_secs: u64,
    bytes_since_tick: AtomicU64,
    dial: ThroughputDial,
}

impl ThroughputController {
    /// Builds a controller from `config`, driving `dial`.
    #[must_use]
    pub fn new(config: &CacheConfig, dial: ThroughputDial) -> Self {
        Self {
            limit_bytes_per_sec: config.write_avg_rate_limit,
            tolerance: config.throughput_tolerance,
            adjustment_steps: config.throughput_adjustment_steps.max(1),
            check_interval_secs: config.throughput_check_interval_secs.max(1),
            bytes_since_tick: AtomicU64::new(0),
            dial,
        }
    }

    /// How often [`Self::tick`] should be called, in seconds
    /// (`throughput.check.interval.sec`).
    #[must_use]
    pub fn check_interval_secs(&self) -> u64 {
        self.check_interval_secs
    }

    /// Records `bytes` written since the last tick; called from every
    /// successful `put`.
    pub fn record_write(&self, bytes: u64) {
        self.bytes_since_tick.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Evaluates the measured rate against the configured limit and steps
    /// the dial by `1 / adjustment_steps` of its span per tick, tightening
    /// admission if over budget or relaxing it if comfortably under.
    /// Returns the observed bytes/sec for this interval.
    pub fn tick(&self) -> u64 {
        let bytes = self.bytes_since_tick.swap(0, Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let rate = bytes as f64 / self.check_interval_secs as f64;
        let limit = self.limit_bytes_per_sec as f64;

        if limit > 0.0 && rate > limit * (1.0 + self.tolerance as f64) {
            self.step(&StepDirection::Tighten);
        } else if limit > 0.0 && rate < limit * (1.0 - self.tolerance as f64) {
            self.step(&StepDirection::Relax);
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            rate as u64
        }
    }

    fn step(&self, direction: &StepDirection) {
        match &self.dial {
            ThroughputDial::AdmissionQueueSize { queue, min_size, max_size } => {
                let span = max_size.saturating_sub(*min_size).max(1);
                let step = (span / self.adjustment_steps as usize).max(1);
                let current = queue.capacity();
                let next = match direction {
                    // fewer tracked hashes means more one-hit-wonders get
                    // forgotten before a second sighting, admitting less
                    StepDirection::Tighten => current.saturating_sub(step).max(*min_size),
                    StepDirection::Relax => (current + step).min(*max_size),
                };
                queue.set_capacity(next);
            }
            ThroughputDial::ScavengerDumpBelow(scavenger) => {
                #[allow(clippy::cast_precision_loss)]
                let step = 1.0 / self.adjustment_steps as f32;
                let current = scavenger.dump_below_ratio();
                let next = match direction {
                    StepDirection::Tighten => current + step,
                    StepDirection::Relax => current - step,
                };
                scavenger.set_dump_below_ratio(next);
            }
        }
    }
}
