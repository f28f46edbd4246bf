//! Sample Clock and Event Signals
//!
//! Decouples interrupt-time events from the main polling loop:
//! - A free-running millisecond clock advanced by the timestamp interrupt
//! - One single-slot signal per interrupt source, each carrying the
//!   (ms, us) pair captured when the interrupt fired
//! - Narrow writer handles so an interrupt handler can only raise its own signal

mod clock;
mod irq;
mod signal;
mod timer;

pub use clock::SampleClock;
pub use irq::{timestamp_tick, IrqWriter};
pub use signal::{EventSignal, SignalKind, SignalSet, TimestampPair};
pub use timer::{HostMicrosTimer, MicrosTimer, ScaledTimer};
