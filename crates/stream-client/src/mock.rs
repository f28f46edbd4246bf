//! Scripted in-memory transport

use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent};
use std::collections::VecDeque;

/// In-memory [`Transport`] that records calls and replays queued events.
///
/// With [`MockTransport::cooperative`] it confirms every connect and send
/// on its own, which is enough to drive a client end to end.
#[derive(Debug, Default)]
pub struct MockTransport {
    events: VecDeque<TransportEvent>,
    sent: Vec<Vec<u8>>,
    connect_calls: u32,
    close_calls: u32,
    abort_calls: u32,
    refuse_connects: bool,
    reject_sends: bool,
    auto_complete: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `Connected` after each connect and `Sent` after each send
    pub fn cooperative() -> Self {
        Self {
            auto_complete: true,
            ..Self::default()
        }
    }

    pub fn push_event(&mut self, event: TransportEvent) {
        self.events.push_back(event);
    }

    pub fn refuse_connects(&mut self, refuse: bool) {
        self.refuse_connects = refuse;
    }

    pub fn reject_sends(&mut self, reject: bool) {
        self.reject_sends = reject;
    }

    /// Frames accepted by `send`, oldest first
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls
    }

    pub fn abort_calls(&self) -> u32 {
        self.abort_calls
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.refuse_connects {
            return Err(TransportError::Refused("scripted".to_string()));
        }
        self.connect_calls += 1;
        if self.auto_complete {
            self.events.push_back(TransportEvent::Connected);
        }
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.reject_sends {
            return Err(TransportError::Closed);
        }
        self.sent.push(frame.to_vec());
        if self.auto_complete {
            self.events.push_back(TransportEvent::Sent);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.close_calls += 1;
    }

    fn abort(&mut self) {
        self.abort_calls += 1;
        self.events.clear();
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }
}
