//! Non-blocking transport primitives

use crate::error::TransportError;

/// Completion notifications from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake with the collector succeeded
    Connected,
    /// Connect attempt failed
    ConnectFailed,
    /// The frame handed to `send` has been written out
    Sent,
    /// The connection was reset by the peer or the stack
    Reset,
}

/// Outbound byte-stream transport.
///
/// Every operation returns immediately; completions arrive later through
/// [`Transport::poll_event`]. Events belonging to an attempt that was
/// aborted are never delivered.
pub trait Transport {
    /// Start a connect attempt to the collector
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Hand one frame to the confirmed connection
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Release a connection whose send has completed
    fn close(&mut self);

    /// Discard any pending attempt or connection
    fn abort(&mut self);

    /// Next completion notification, if any
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn abort(&mut self) {
        (**self).abort()
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        (**self).poll_event()
    }
}
