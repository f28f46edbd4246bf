//! Millisecond Sample Clock

use std::sync::atomic::{AtomicU32, Ordering};

/// Free-running millisecond counter, the base of every capture timestamp.
///
/// Only the timestamp interrupt advances it; everything else reads it.
/// The counter wraps at `u32::MAX`.
#[derive(Debug, Default)]
pub struct SampleClock {
    millis: AtomicU32,
}

impl SampleClock {
    /// Create a clock at zero (power-up state)
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a clock already at `millis`
    pub const fn starting_at(millis: u32) -> Self {
        Self {
            millis: AtomicU32::new(millis),
        }
    }

    /// Advance by one millisecond
    pub fn tick(&self) {
        // fetch_add wraps on overflow
        self.millis.fetch_add(1, Ordering::Relaxed);
    }

    /// Current millisecond count
    pub fn now_ms(&self) -> u32 {
        self.millis.load(Ordering::Relaxed)
    }
}
