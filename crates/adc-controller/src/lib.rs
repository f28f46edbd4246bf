//! Dual-Channel Acquisition Controller
//!
//! Brings two 4-channel analog front ends out of reset with an ordered
//! register-write sequence, then streams their output one full-width bus
//! transfer per data-ready signal.

mod controller;
mod error;
mod front_end;
pub mod regs;

pub use controller::{AcquisitionController, BringUpTiming, ServiceOutcome};
pub use error::AdcError;
pub use front_end::{AdcFrontEnd, BringUpReport, DeviceId, FrontEndConfig, ReadbackEntry};
pub use regs::SampleRatePreset;

/// Bytes per output word (status, channel data or reserved)
pub const WORD_BYTES: usize = 3;

/// Data channels per front end
pub const DATA_CHANNELS: usize = 4;

/// One output record: status word, four data words, one reserved word
pub const RECORD_BYTES: usize = WORD_BYTES * (DATA_CHANNELS + 2);

/// Raw output record of one front end
pub type AdcRecord = [u8; RECORD_BYTES];
