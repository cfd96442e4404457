//! Live progress of a sync or projection loop, readable from other tasks.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

use crate::retry::RetryPolicy;
use crate::types::Height;

/// Progress counters owned by one loop. Only that loop writes them.
#[derive(Debug, Default)]
pub struct Progress {
    next_height: AtomicU64,
    consecutive_failures: AtomicU32,
    stalled: AtomicBool,
}

/// Point-in-time copy of a [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Next height the loop will process (0 before initialisation).
    pub next_height: Height,
    /// Failures on `next_height` since the last success.
    pub consecutive_failures: u32,
    /// Set once the failures crossed the policy's alert threshold.
    pub stalled: bool,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            next_height: self.next_height.load(Ordering::Acquire),
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            stalled: self.stalled.load(Ordering::Acquire),
        }
    }

    /// Position the loop at `next` without touching the failure count.
    pub fn set_next(&self, next: Height) {
        self.next_height.store(next, Ordering::Release);
    }

    /// A height succeeded: move to `next` and clear the failure run.
    pub fn record_success(&self, next: Height) {
        self.next_height.store(next, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        self.stalled.store(false, Ordering::Release);
    }

    /// A height failed. Returns the new consecutive failure count.
    pub fn record_failure(&self, height: Height, policy: &RetryPolicy) -> u32 {
        self.next_height.store(height, Ordering::Release);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if policy.is_stalled(failures) {
            self.stalled.store(true, Ordering::Release);
        }
        failures
    }
}
