//! High-resolution timer sources

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Sub-millisecond timer read at capture time
pub trait MicrosTimer {
    /// Microseconds into the current millisecond
    fn micros(&self) -> u32;
}

/// Raw tick source divided down to microseconds.
///
/// Some timer peripherals report in fractions of a microsecond (the
/// capture timer on the reference board counts in 1/100 us).
pub struct ScaledTimer<F> {
    source: F,
    ticks_per_micro: u32,
}

impl<F> ScaledTimer<F>
where
    F: Fn() -> u32,
{
    /// Wrap `source`, dividing its reading by `ticks_per_micro` (0 is treated as 1)
    pub fn new(source: F, ticks_per_micro: u32) -> Self {
        Self {
            source,
            ticks_per_micro: ticks_per_micro.max(1),
        }
    }
}

impl<F> MicrosTimer for ScaledTimer<F>
where
    F: Fn() -> u32,
{
    fn micros(&self) -> u32 {
        (self.source)() / self.ticks_per_micro
    }
}

/// Host monotonic clock restarted by every millisecond tick.
///
/// The tick source calls [`mark_tick`](Self::mark_tick) right after
/// advancing the sample clock, so a capture reads the time since the
/// millisecond it is paired with began.
#[derive(Debug)]
pub struct HostMicrosTimer {
    origin: Instant,
    /// Nanoseconds from `origin` to the last tick
    tick_at: AtomicU64,
}

impl HostMicrosTimer {
    /// Start counting from now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            tick_at: AtomicU64::new(0),
        }
    }

    /// Restart the count at the current instant
    pub fn mark_tick(&self) {
        self.tick_at.store(self.elapsed_nanos(), Ordering::Release);
    }

    /// Nanoseconds since the last tick, wrapped to one millisecond
    pub fn nanos_into_tick(&self) -> u32 {
        let since = self
            .elapsed_nanos()
            .saturating_sub(self.tick_at.load(Ordering::Acquire));
        (since % 1_000_000) as u32
    }

    fn elapsed_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

impl Default for HostMicrosTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrosTimer for HostMicrosTimer {
    fn micros(&self) -> u32 {
        self.nanos_into_tick() / 1000
    }
}
