//! Interrupt-side handlers
//!
//! Everything here runs to completion in O(1), never blocks and never
//! touches the bus.

use crate::clock::SampleClock;
use crate::signal::{EventSignal, TimestampPair};
use crate::timer::MicrosTimer;

/// Timestamp interrupt body: one tick per millisecond, nothing else
pub fn timestamp_tick(clock: &SampleClock) {
    clock.tick();
}

/// The only write access an interrupt handler gets: raise its own signal.
#[derive(Debug, Clone, Copy)]
pub struct IrqWriter<'a> {
    clock: &'a SampleClock,
    signal: &'a EventSignal,
}

impl<'a> IrqWriter<'a> {
    pub(crate) fn new(clock: &'a SampleClock, signal: &'a EventSignal) -> Self {
        Self { clock, signal }
    }

    /// Capture (ms, us) now and raise the signal.
    ///
    /// The microsecond timer is read before the millisecond counter, matching
    /// the capture order of the data-ready and scan-timer interrupts.
    pub fn capture(&self, timer: &impl MicrosTimer) -> TimestampPair {
        let us = timer.micros();
        let ms = self.clock.now_ms();
        let stamp = TimestampPair::new(ms, us);
        self.signal.raise(stamp);
        stamp
    }

    /// Raise the signal with an externally captured stamp
    pub fn raise_at(&self, stamp: TimestampPair) {
        self.signal.raise(stamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{SignalKind, SignalSet};
    use crate::timer::ScaledTimer;

    struct FixedTimer(u32);

    impl MicrosTimer for FixedTimer {
        fn micros(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn test_capture_snapshots_clock_and_timer() {
        let signals = SignalSet::new();
        for _ in 0..7 {
            timestamp_tick(signals.clock());
        }

        let stamp = signals
            .writer(SignalKind::ThermocoupleScan)
            .capture(&FixedTimer(250));

        assert_eq!(stamp, TimestampPair::new(7, 250));
        let signal = signals.get(SignalKind::ThermocoupleScan);
        assert!(signal.is_set());
        assert_eq!(signal.timestamp(), stamp);
    }

    #[test]
    fn test_recapture_overwrites_pending_stamp() {
        let signals = SignalSet::new();
        let writer = signals.writer(SignalKind::DeviceAReady);
        writer.capture(&FixedTimer(1));
        timestamp_tick(signals.clock());
        writer.capture(&FixedTimer(2));

        assert_eq!(
            signals.get(SignalKind::DeviceAReady).timestamp(),
            TimestampPair::new(1, 2)
        );
    }

    #[test]
    fn test_capture_through_scaled_timer() {
        let signals = SignalSet::new();
        let timer = ScaledTimer::new(|| 45_600, 100);
        let stamp = signals.writer(SignalKind::DeviceBReady).capture(&timer);
        assert_eq!(stamp.us, 456);
    }
}
