// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Clock abstraction for timer-driven periodic tasks (Scavenger trigger,
//! Throughput Controller interval).
//!
//! Design Note: "Timer-driven periodic tasks. Replace `TimerTask` with a
//! dedicated scheduler abstraction allowing deterministic injection in
//! tests (virtual clock)." [`SystemClock`] is used in production;
//! [`VirtualClock`] lets tests simulate "wait > run-interval" without
//! sleeping.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of monotonic time.
pub trait Clock: Send + Sync {
    /// Returns the current instant according to this clock.
    fn now(&self) -> Instant;
}

/// Wraps [`std::time::Instant`] for production use.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only advances when told to, for deterministic tests.
#[derive(Clone)]
pub struct VirtualClock(Arc<Mutex<Instant>>);

impl Default for VirtualClock {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }
}

impl VirtualClock {
    /// Creates a new virtual clock anchored at the current wall time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.0.lock();
        *now += duration;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        *self.0.lock()
    }
}

/// Returns milliseconds since the Unix epoch, used for `expire` timestamps.
///
/// Expiration is expressed as absolute wall-clock time (spec §3: `expire`),
/// which a [`Clock`] abstraction over [`Instant`] cannot produce directly,
/// so this is a thin, separately-mockable seam: tests that need to control
/// "now" for expiration construct deadlines relative to this function's
/// value at call time rather than via the [`Clock`] trait.
#[must_use]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_only_advances_when_told() {
        let clock = VirtualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now(), t0 + Duration::from_secs(60));
    }
}
