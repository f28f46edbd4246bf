//! Transport Error Types

use thiserror::Error;

/// Errors returned by transport operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Send requested without a confirmed connection
    #[error("No connection ready for sending")]
    NotConnected,

    /// The connection went away before the frame was handed over
    #[error("Connection closed")]
    Closed,

    /// Connect refused immediately by the local stack
    #[error("Connect refused: {0}")]
    Refused(String),

    /// No async runtime available to drive the connection
    #[error("No async runtime available")]
    NoRuntime,

    /// Socket-level I/O error
    #[error("Socket error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}
