//! Shared bus primitives

use crate::error::BusError;
use crate::framing::MAX_SELECT_LINES;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bus-select line designating which attached device gets the next transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectLine(u8);

impl SelectLine {
    /// Create a select line, rejecting numbers past the controller's range
    pub fn new(line: u8) -> Result<Self, BusError> {
        if line < MAX_SELECT_LINES {
            Ok(Self(line))
        } else {
            Err(BusError::InvalidLine(line))
        }
    }

    /// Line number
    pub fn number(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for SelectLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SS{}", self.0)
    }
}

/// Non-blocking shared serial bus.
///
/// At most one transaction is in flight. Callers check [`SharedBus::is_busy`]
/// before starting one; the bus never queues. Received bytes are in `rx`
/// when `receive`/`transfer` return, but the bus keeps reporting busy until
/// the controller has finished clocking the frame.
pub trait SharedBus {
    /// Whether a transaction is still in flight
    fn is_busy(&mut self) -> bool;

    /// Route the next transaction to `line`
    fn select(&mut self, line: SelectLine) -> Result<(), BusError>;

    /// Clock in `rx.len()` bytes from the selected device
    fn receive(&mut self, rx: &mut [u8]) -> Result<(), BusError>;

    /// Full-duplex exchange with the selected device
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), BusError>;

    /// Fix the frame width used for `line` so a transaction of up to `bytes`
    /// is not split
    fn set_frame_width(&mut self, line: SelectLine, bytes: usize) -> Result<(), BusError>;
}

impl<B: SharedBus + ?Sized> SharedBus for &mut B {
    fn is_busy(&mut self) -> bool {
        (**self).is_busy()
    }

    fn select(&mut self, line: SelectLine) -> Result<(), BusError> {
        (**self).select(line)
    }

    fn receive(&mut self, rx: &mut [u8]) -> Result<(), BusError> {
        (**self).receive(rx)
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), BusError> {
        (**self).transfer(tx, rx)
    }

    fn set_frame_width(&mut self, line: SelectLine, bytes: usize) -> Result<(), BusError> {
        (**self).set_frame_width(line, bytes)
    }
}
