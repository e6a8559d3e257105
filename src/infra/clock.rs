//! Injectable clock abstraction
//!
//! Expiry logic compares epoch-millisecond timestamps, so swapping the
//! clock lets tests drive time deterministically without wall-clock waits.

use crate::domain::snapshot::epoch_ms;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of "now" for the engine and its periodic tasks
pub trait Clock: Send + Sync {
    /// Current time as epoch milliseconds
    fn now_ms(&self) -> u64;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        epoch_ms()
    }
}

/// Manually driven clock for deterministic tests
#[derive(Debug)]
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self { ms: AtomicU64::new(start_ms) }
    }

    pub fn set(&self, ms: u64) {
        self.ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}
