//! Clock abstraction so admission timing can be faked in tests.
//!
//! Algorithms work in fractional seconds since the unix epoch; the backing
//! store's own clock is authoritative for TTL expiry, so the reference
//! in-memory store takes the same `Clock` handle as the engine.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" for refill, window, and expiry arithmetic.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Seconds since the unix epoch.
    fn now(&self) -> f64;
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
    }
}

/// Test clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Create a clock pinned at t = 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock pinned at `now` seconds.
    pub fn at(now: f64) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        *self.now.lock().unwrap() += seconds;
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, now: f64) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}
