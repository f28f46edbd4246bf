//! Round-robin scan state machine

use crate::{ThermocoupleBuffer, THERMOCOUPLE_BYTES, THERMOCOUPLE_CHANNELS};
use event_signals::EventSignal;
use spi_bus::{BusError, SelectLine, SharedBus};
use tracing::{debug, trace, warn};

/// Next thermocouple channel to service, in `[0, 3]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCursor(u8);

impl ScanCursor {
    /// Cursor at channel 0
    pub const fn new() -> Self {
        Self(0)
    }

    /// Cursor from a raw value; may be out of range
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Channel the cursor points at
    pub fn channel(&self) -> u8 {
        self.0
    }

    /// Whether the cursor points at an existing channel
    pub fn is_valid(&self) -> bool {
        (self.0 as usize) < THERMOCOUPLE_CHANNELS
    }

    /// Move to the next channel; returns true when wrapping back to 0
    fn advance(&mut self) -> bool {
        self.0 += 1;
        if self.0 as usize >= THERMOCOUPLE_CHANNELS {
            self.0 = 0;
            true
        } else {
            false
        }
    }
}

/// Outcome of one scanner poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStep {
    /// No scan pending
    Idle,
    /// Scan pending but the bus is occupied; retried next iteration
    Deferred,
    /// One channel read
    Read {
        /// Channel serviced
        channel: u8,
        /// This read finished the scan
        complete: bool,
        /// The cursor was out of range and had to be reset first
        cursor_reset: bool,
    },
    /// The bus rejected the transaction; cursor and signal are unchanged
    Failed {
        /// Channel that was attempted
        channel: u8,
        /// Bus error
        error: BusError,
    },
}

/// Thermocouple scanner owning the four channel buffers
#[derive(Debug)]
pub struct ThermocoupleScanner {
    /// Select line per channel
    lines: [SelectLine; THERMOCOUPLE_CHANNELS],
    cursor: ScanCursor,
    buffers: [ThermocoupleBuffer; THERMOCOUPLE_CHANNELS],
    /// Set when a full scan completes, taken by the consumer
    fresh: bool,
    completed_scans: u32,
}

impl ThermocoupleScanner {
    /// Create a scanner using `lines[n]` for channel `n`
    pub fn new(lines: [SelectLine; THERMOCOUPLE_CHANNELS]) -> Self {
        debug!("Thermocouple scanner on lines {:?}", lines);
        Self {
            lines,
            cursor: ScanCursor::new(),
            buffers: [[0; THERMOCOUPLE_BYTES]; THERMOCOUPLE_CHANNELS],
            fresh: false,
            completed_scans: 0,
        }
    }

    /// Advance the scan by at most one bus transaction.
    ///
    /// Requires the scan-due `signal` to be set and the bus to be idle. The
    /// signal is cleared only after channel 3 has been read.
    pub fn poll<B: SharedBus + ?Sized>(&mut self, bus: &mut B, signal: &EventSignal) -> ScanStep {
        if !signal.is_set() {
            return ScanStep::Idle;
        }
        if bus.is_busy() {
            trace!("Thermocouple scan deferred: bus busy");
            return ScanStep::Deferred;
        }

        let cursor_reset = !self.cursor.is_valid();
        if cursor_reset {
            warn!(
                "Scan cursor {} out of range, restarting at channel 0",
                self.cursor.channel()
            );
            self.cursor = ScanCursor::new();
        }

        let channel = self.cursor.channel();
        let idx = channel as usize;
        let result = bus
            .select(self.lines[idx])
            .and_then(|_| bus.receive(&mut self.buffers[idx]));
        if let Err(error) = result {
            warn!("Thermocouple channel {} read failed: {}", channel, error);
            return ScanStep::Failed { channel, error };
        }

        let complete = self.cursor.advance();
        if complete {
            signal.clear();
            self.fresh = true;
            self.completed_scans = self.completed_scans.wrapping_add(1);
            debug!("Thermocouple scan {} complete", self.completed_scans);
        }

        ScanStep::Read {
            channel,
            complete,
            cursor_reset,
        }
    }

    /// Raw channel buffers
    pub fn buffers(&self) -> &[ThermocoupleBuffer; THERMOCOUPLE_CHANNELS] {
        &self.buffers
    }

    /// Current cursor
    pub fn cursor(&self) -> ScanCursor {
        self.cursor
    }

    /// Overwrite the cursor (restores state after a warm restart)
    pub fn set_cursor(&mut self, cursor: ScanCursor) {
        self.cursor = cursor;
    }

    /// Whether a full scan completed since the last call
    pub fn take_fresh(&mut self) -> bool {
        std::mem::take(&mut self.fresh)
    }

    /// Number of completed scans (wraps)
    pub fn completed_scans(&self) -> u32 {
        self.completed_scans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_signals::{SignalKind, SignalSet, TimestampPair};
    use proptest::prelude::*;
    use spi_bus::SimulatedBus;

    fn lines() -> [SelectLine; 4] {
        [0, 1, 2, 3].map(|n| SelectLine::new(n).unwrap())
    }

    fn trigger(signals: &SignalSet) {
        signals
            .writer(SignalKind::ThermocoupleScan)
            .raise_at(TimestampPair::new(100, 5));
    }

    #[test]
    fn test_idle_without_signal() {
        let signals = SignalSet::new();
        let mut bus = SimulatedBus::new(0).with_recording();
        let mut scanner = ThermocoupleScanner::new(lines());

        let signal = signals.get(SignalKind::ThermocoupleScan);
        assert_eq!(scanner.poll(&mut bus, signal), ScanStep::Idle);
        assert!(bus.transactions().is_empty());
    }

    #[test]
    fn test_full_scan_visits_channels_in_order() {
        let signals = SignalSet::new();
        let mut bus = SimulatedBus::new(0).with_recording();
        let mut scanner = ThermocoupleScanner::new(lines());
        let signal = signals.get(SignalKind::ThermocoupleScan);
        trigger(&signals);

        for expected in 0..4u8 {
            match scanner.poll(&mut bus, signal) {
                ScanStep::Read { channel, complete, .. } => {
                    assert_eq!(channel, expected);
                    assert_eq!(complete, expected == 3);
                }
                other => panic!("unexpected step {:?}", other),
            }
        }

        assert!(!signal.is_set());
        assert!(scanner.take_fresh());
        assert!(!scanner.take_fresh());
        assert_eq!(scanner.completed_scans(), 1);
        assert_eq!(scanner.poll(&mut bus, signal), ScanStep::Idle);

        let visited: Vec<u8> = bus.transactions().iter().map(|t| t.line.number()).collect();
        assert_eq!(visited, vec![0, 1, 2, 3]);
        assert!(bus.transactions().iter().all(|t| t.len == 4));
    }

    #[test]
    fn test_receive_lands_in_channel_buffer() {
        let signals = SignalSet::new();
        let mut bus = SimulatedBus::new(0);
        bus.respond_with(lines()[2], vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let mut scanner = ThermocoupleScanner::new(lines());
        let signal = signals.get(SignalKind::ThermocoupleScan);
        trigger(&signals);

        for _ in 0..4 {
            scanner.poll(&mut bus, signal);
        }
        assert_eq!(scanner.buffers()[2], [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_busy_bus_defers_without_advancing() {
        let signals = SignalSet::new();
        let mut bus = SimulatedBus::new(0);
        let mut scanner = ThermocoupleScanner::new(lines());
        let signal = signals.get(SignalKind::ThermocoupleScan);
        trigger(&signals);

        bus.hold_busy(1);
        assert_eq!(scanner.poll(&mut bus, signal), ScanStep::Deferred);
        assert_eq!(scanner.cursor(), ScanCursor::new());
        assert!(signal.is_set());
    }

    #[test]
    fn test_corrupt_cursor_resets_to_zero() {
        let signals = SignalSet::new();
        let mut bus = SimulatedBus::new(0).with_recording();
        let mut scanner = ThermocoupleScanner::new(lines());
        let signal = signals.get(SignalKind::ThermocoupleScan);
        trigger(&signals);

        scanner.set_cursor(ScanCursor::from_raw(9));
        assert_eq!(
            scanner.poll(&mut bus, signal),
            ScanStep::Read {
                channel: 0,
                complete: false,
                cursor_reset: true
            }
        );
        assert_eq!(bus.transactions()[0].line.number(), 0);
        assert_eq!(scanner.cursor().channel(), 1);
    }

    #[test]
    fn test_bus_error_keeps_cursor_and_signal() {
        let signals = SignalSet::new();
        let mut bus = SimulatedBus::new(0);
        let wide = SelectLine::new(7).unwrap();
        let mut scanner = ThermocoupleScanner::new([wide, wide, wide, wide]);
        // A 3-byte frame splits the 4-byte read
        bus.set_frame_width(wide, 3).unwrap();
        let signal = signals.get(SignalKind::ThermocoupleScan);
        trigger(&signals);

        match scanner.poll(&mut bus, signal) {
            ScanStep::Failed { channel, error } => {
                assert_eq!(channel, 0);
                assert_eq!(error, BusError::FrameSplit { len: 4, width: 3 });
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(scanner.cursor().channel(), 0);
        assert!(signal.is_set());
    }

    proptest! {
        #[test]
        fn prop_cursor_visits_each_channel_once_per_trigger(
            busy in proptest::collection::vec(0u32..3, 1..60),
            scans in 1usize..5,
        ) {
            let signals = SignalSet::new();
            let mut bus = SimulatedBus::new(0).with_recording();
            let mut scanner = ThermocoupleScanner::new(lines());
            let signal = signals.get(SignalKind::ThermocoupleScan);

            let mut busy = busy.into_iter().cycle();
            for _ in 0..scans {
                trigger(&signals);
                while signal.is_set() {
                    let held = busy.next().unwrap_or(0);
                    bus.hold_busy(held);
                    for _ in 0..held {
                        prop_assert_eq!(scanner.poll(&mut bus, signal), ScanStep::Deferred);
                    }
                    let step = scanner.poll(&mut bus, signal);
                    let is_read = matches!(step, ScanStep::Read { .. });
                    prop_assert!(is_read);
                }
            }

            let visited: Vec<u8> = bus.transactions().iter().map(|t| t.line.number()).collect();
            prop_assert_eq!(visited.len(), scans * 4);
            for (i, line) in visited.iter().enumerate() {
                prop_assert_eq!(*line as usize, i % 4);
            }
            prop_assert_eq!(scanner.completed_scans() as usize, scans);
        }
    }
}
