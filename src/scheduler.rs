// Copyright (c) 2024-present, carrot-cache
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Background task scheduling for the Scavenger's `scavenger.run.interval.sec`
//! tick and the Throughput Controller's `throughput.check.interval.sec` tick
//! (spec §3/§6).
//!
//! Design Note: "Timer-driven periodic tasks. Replace `TimerTask` with a
//! dedicated scheduler abstraction allowing deterministic injection in
//! tests." A single background thread per task, parked between runs and
//! woken early by `stop()`, mirrors the park/unpark pattern used elsewhere
//! in the corpus for this kind of maintenance loop rather than pulling in
//! an async runtime for one timer.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runs `task` on its own thread every `interval`, until dropped or
/// [`PeriodicTask::stop`] is called.
pub struct PeriodicTask {
    should_stop: Arc<AtomicBool>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Spawns a thread that calls `task` once, then every `interval`
    /// thereafter, until stopped. `task` should be cheap to call when there
    /// is nothing to do (both the Scavenger and Throughput Controller
    /// early-exit when their trigger condition isn't met).
    #[must_use]
    pub fn spawn<F>(interval: Duration, mut task: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop_flag = should_stop.clone();

        let handle = std::thread::spawn(move || loop {
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            task();
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            std::thread::park_timeout(interval);
        });

        Self {
            should_stop,
            thread: Mutex::new(Some(handle)),
        }
    }

    /// Signals the task to stop and waits for its thread to exit.
    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.lock().take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
