//! Thermocouple Scanner
//!
//! Walks four thermocouple channels over the shared bus, one bus
//! transaction per main-loop iteration, once the scan timer has fired.

mod scanner;

pub use scanner::{ScanCursor, ScanStep, ThermocoupleScanner};

/// Number of thermocouple channels in one scan
pub const THERMOCOUPLE_CHANNELS: usize = 4;

/// Raw bytes read from one thermocouple converter
pub const THERMOCOUPLE_BYTES: usize = 4;

/// Raw reading of one thermocouple channel
pub type ThermocoupleBuffer = [u8; THERMOCOUPLE_BYTES];
