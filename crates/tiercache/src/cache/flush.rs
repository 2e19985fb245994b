//! Periodic write-through gate.
//!
//! Time is cut into epochs of `interval` length on the injected clock. The
//! first caller to observe a new epoch wins the boundary and flushes; every
//! other caller in the same epoch writes locally only.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::clock::Clock;

#[derive(Debug)]
pub struct FlushGate {
    interval_ms: u64,
    last_epoch: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl FlushGate {
    /// A zero interval makes every call a boundary (plain write-through).
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let interval_ms = interval.as_millis() as u64;
        let start = if interval_ms == 0 {
            0
        } else {
            clock.now_millis() / interval_ms
        };
        Self {
            interval_ms,
            last_epoch: AtomicU64::new(start),
            clock,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns `true` for exactly one caller per newly reached epoch.
    pub fn try_cross(&self) -> bool {
        if self.interval_ms == 0 {
            return true;
        }
        let epoch = self.clock.now_millis() / self.interval_ms;
        let mut last = self.last_epoch.load(Ordering::Acquire);
        while epoch > last {
            match self.last_epoch.compare_exchange_weak(
                last,
                epoch,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => last = actual,
            }
        }
        false
    }
}
