//! Progress reporting and cancellation for long-running stages.
//!
//! Schedulers poll their workers and forward counts to a
//! [`ProgressObserver`]; the observer never sees threads or channels.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Answer to a slow-run prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDecision {
    /// Keep going until the next prompt.
    Continue,
    /// Stop scheduling new work and return what has completed.
    Cancel,
}

/// Receives progress from batch operations.
pub trait ProgressObserver {
    /// Called whenever the completed count changes.
    fn on_progress(&mut self, _completed: usize, _total: usize) {}

    /// Called each time another `slow_after` interval elapses.
    fn on_slow(&mut self, _elapsed: Duration) -> BatchDecision {
        BatchDecision::Continue
    }
}

/// Observer that ignores progress and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Scheduling parameters for frame batches.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BatchOptions {
    /// Worker threads; 0 selects the available hardware parallelism.
    pub workers: usize,
    /// How long the controlling thread waits between progress checks.
    pub poll_interval: Duration,
    /// Interval after which the observer is asked whether to continue.
    pub slow_after: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            poll_interval: Duration::from_millis(50),
            slow_after: Duration::from_secs(10),
        }
    }
}

impl BatchOptions {
    /// Sets the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the slow-run prompt interval.
    #[must_use]
    pub fn with_slow_after(mut self, slow_after: Duration) -> Self {
        self.slow_after = slow_after;
        self
    }

    /// Worker count with 0 resolved to the hardware parallelism.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        } else {
            self.workers
        }
    }
}
