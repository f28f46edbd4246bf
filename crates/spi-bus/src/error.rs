//! Bus Error Types

use thiserror::Error;

/// Errors reported by a shared bus
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// A transaction was requested while another one is in flight
    #[error("Bus busy: transaction already in flight")]
    Busy,

    /// Select line outside the controller's range
    #[error("Select line {0} is not available")]
    InvalidLine(u8),

    /// No device selected before a transaction
    #[error("No device selected")]
    NoSelection,

    /// Transaction longer than the configured frame width
    #[error("Transaction of {len} bytes would split at frame width {width}")]
    FrameSplit { len: usize, width: usize },

    /// Frame width outside what the controller supports
    #[error("Unsupported frame width: {0} bytes")]
    UnsupportedFrameWidth(usize),

    /// Transmit and receive buffers differ in length
    #[error("Transfer length mismatch: tx {tx} bytes, rx {rx} bytes")]
    LengthMismatch { tx: usize, rx: usize },
}
