//! Single-slot interrupt signals

use crate::clock::SampleClock;
use crate::irq::IrqWriter;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Capture time of an event: milliseconds from the sample clock plus the
/// sub-millisecond offset read from the high-resolution timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TimestampPair {
    /// Sample clock value at capture
    pub ms: u32,
    /// Microseconds into the current millisecond (expected < 1000)
    pub us: u32,
}

impl TimestampPair {
    /// Microseconds in one sample clock tick
    pub const MICROS_PER_MILLI: u32 = 1000;

    /// Create a new timestamp pair
    pub const fn new(ms: u32, us: u32) -> Self {
        Self { ms, us }
    }

    /// Whether the microsecond part is inside the current millisecond.
    ///
    /// A timer source that overruns 1000 is a hardware/config defect; callers
    /// report it and keep the raw value.
    pub fn is_well_formed(&self) -> bool {
        self.us < Self::MICROS_PER_MILLI
    }

    fn pack(self) -> u64 {
        (u64::from(self.ms) << 32) | u64::from(self.us)
    }

    fn unpack(word: u64) -> Self {
        Self {
            ms: (word >> 32) as u32,
            us: word as u32,
        }
    }
}

impl fmt::Display for TimestampPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms+{}us", self.ms, self.us)
    }
}

/// Interrupt sources monitored by the main loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Thermocouple scan timer fired
    ThermocoupleScan,
    /// Analog front end A has a sample ready
    DeviceAReady,
    /// Analog front end B has a sample ready
    DeviceBReady,
    /// Frame transmit timer fired
    TransmitDue,
}

impl SignalKind {
    /// All signals, in slot order
    pub const ALL: [SignalKind; 4] = [
        SignalKind::ThermocoupleScan,
        SignalKind::DeviceAReady,
        SignalKind::DeviceBReady,
        SignalKind::TransmitDue,
    ];

    /// Stable name used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::ThermocoupleScan => "thermocouple",
            SignalKind::DeviceAReady => "device_a",
            SignalKind::DeviceBReady => "device_b",
            SignalKind::TransmitDue => "transmit",
        }
    }

    fn slot(self) -> usize {
        match self {
            SignalKind::ThermocoupleScan => 0,
            SignalKind::DeviceAReady => 1,
            SignalKind::DeviceBReady => 2,
            SignalKind::TransmitDue => 3,
        }
    }
}

/// One boolean signal plus its companion timestamp pair.
///
/// Single producer (the interrupt that owns it), single consumer (the main
/// loop). The pair is packed into one 64-bit word so both halves are
/// always observed together.
#[derive(Debug, Default)]
pub struct EventSignal {
    raised: AtomicBool,
    stamp: AtomicU64,
}

impl EventSignal {
    /// Create a cleared signal
    pub const fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
            stamp: AtomicU64::new(0),
        }
    }

    pub(crate) fn raise(&self, stamp: TimestampPair) {
        self.stamp.store(stamp.pack(), Ordering::Release);
        self.raised.store(true, Ordering::Release);
    }

    /// Whether the signal is pending
    pub fn is_set(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Timestamp of the most recent raise
    pub fn timestamp(&self) -> TimestampPair {
        TimestampPair::unpack(self.stamp.load(Ordering::Acquire))
    }

    /// Clear the signal once the consumer has fully acted on it.
    ///
    /// Returns whether it was set.
    pub fn clear(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }
}

/// The sample clock and all four event signals.
///
/// Owned for the process lifetime; the main loop reads and clears, interrupt
/// handlers only get [`IrqWriter`]s.
#[derive(Debug, Default)]
pub struct SignalSet {
    clock: SampleClock,
    signals: [EventSignal; 4],
}

impl SignalSet {
    /// Create a set with the clock at zero and every signal cleared
    pub const fn new() -> Self {
        Self::with_clock(SampleClock::new())
    }

    /// Create a set around an existing clock
    pub const fn with_clock(clock: SampleClock) -> Self {
        Self {
            clock,
            signals: [
                EventSignal::new(),
                EventSignal::new(),
                EventSignal::new(),
                EventSignal::new(),
            ],
        }
    }

    /// The shared millisecond clock
    pub fn clock(&self) -> &SampleClock {
        &self.clock
    }

    /// Consumer view of one signal
    pub fn get(&self, kind: SignalKind) -> &EventSignal {
        &self.signals[kind.slot()]
    }

    /// Writer handle for the interrupt that owns `kind`
    pub fn writer(&self, kind: SignalKind) -> IrqWriter<'_> {
        IrqWriter::new(&self.clock, self.get(kind))
    }

    /// Kinds currently pending, in slot order
    pub fn pending(&self) -> impl Iterator<Item = SignalKind> + '_ {
        SignalKind::ALL
            .into_iter()
            .filter(move |kind| self.get(*kind).is_set())
    }
}
