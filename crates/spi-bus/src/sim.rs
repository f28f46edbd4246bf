//! Simulated shared bus
//!
//! Models the busy window of a transaction and produces deterministic
//! payload bytes so the acquisition loop can run without hardware.

use crate::bus::{SelectLine, SharedBus};
use crate::error::BusError;
use crate::framing::{DEFAULT_FRAME_WIDTH, MAX_FRAME_WIDTH};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Kind of a recorded transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Receive only
    Receive,
    /// Full-duplex transfer
    Transfer,
}

/// One transaction seen by the simulated bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Line selected when the transaction started
    pub line: SelectLine,
    /// Receive or transfer
    pub kind: TransactionKind,
    /// Bytes clocked out (empty for receives)
    pub tx: Vec<u8>,
    /// Bytes clocked in
    pub len: usize,
}

/// In-memory bus for hosted runs and tests
#[derive(Debug)]
pub struct SimulatedBus {
    /// `is_busy` polls a transaction stays in flight
    transaction_polls: u32,
    /// Remaining busy polls of the current transaction
    busy_remaining: u32,
    selected: Option<SelectLine>,
    frame_widths: BTreeMap<SelectLine, usize>,
    /// Scripted payloads per line (repeated to fill the receive buffer)
    responses: BTreeMap<SelectLine, Vec<u8>>,
    sequence: u32,
    recording: bool,
    log: Vec<Transaction>,
}

impl SimulatedBus {
    /// Create a simulated bus whose transactions stay busy for
    /// `transaction_polls` calls to `is_busy`
    pub fn new(transaction_polls: u32) -> Self {
        info!(
            "Creating simulated bus ({} busy polls per transaction)",
            transaction_polls
        );
        Self {
            transaction_polls,
            busy_remaining: 0,
            selected: None,
            frame_widths: BTreeMap::new(),
            responses: BTreeMap::new(),
            sequence: 0,
            recording: false,
            log: Vec::new(),
        }
    }

    /// Keep a log of every transaction (tests)
    pub fn with_recording(mut self) -> Self {
        self.recording = true;
        self
    }

    /// Always answer transactions on `line` with `bytes`
    pub fn respond_with(&mut self, line: SelectLine, bytes: impl Into<Vec<u8>>) {
        self.responses.insert(line, bytes.into());
    }

    /// Keep the bus busy for the next `polls` calls to `is_busy`
    pub fn hold_busy(&mut self, polls: u32) {
        self.busy_remaining = polls;
    }

    /// Recorded transactions, oldest first
    pub fn transactions(&self) -> &[Transaction] {
        &self.log
    }

    /// Drop the recorded transactions
    pub fn clear_transactions(&mut self) {
        self.log.clear();
    }

    /// Currently selected line
    pub fn selected(&self) -> Option<SelectLine> {
        self.selected
    }

    /// Frame width in effect for `line`
    pub fn frame_width(&self, line: SelectLine) -> usize {
        self.frame_widths
            .get(&line)
            .copied()
            .unwrap_or(DEFAULT_FRAME_WIDTH)
    }

    /// Total transactions started
    pub fn transaction_count(&self) -> u32 {
        self.sequence
    }

    fn begin(&mut self, kind: TransactionKind, tx: &[u8], rx: &mut [u8]) -> Result<(), BusError> {
        if self.busy_remaining > 0 {
            return Err(BusError::Busy);
        }
        let line = self.selected.ok_or(BusError::NoSelection)?;
        let width = self.frame_width(line);
        if rx.len() > width {
            return Err(BusError::FrameSplit {
                len: rx.len(),
                width,
            });
        }

        match self.responses.get(&line) {
            Some(script) if !script.is_empty() => {
                for (dst, src) in rx.iter_mut().zip(script.iter().cycle()) {
                    *dst = *src;
                }
            }
            _ => {
                let seed = self.sequence as u8;
                for (i, byte) in rx.iter_mut().enumerate() {
                    *byte = seed.wrapping_add(i as u8) ^ (line.number() << 4);
                }
            }
        }

        if self.recording {
            self.log.push(Transaction {
                line,
                kind,
                tx: tx.to_vec(),
                len: rx.len(),
            });
        }

        self.sequence = self.sequence.wrapping_add(1);
        self.busy_remaining = self.transaction_polls;
        Ok(())
    }
}

impl SharedBus for SimulatedBus {
    fn is_busy(&mut self) -> bool {
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            true
        } else {
            false
        }
    }

    fn select(&mut self, line: SelectLine) -> Result<(), BusError> {
        if self.busy_remaining > 0 {
            return Err(BusError::Busy);
        }
        self.selected = Some(line);
        Ok(())
    }

    fn receive(&mut self, rx: &mut [u8]) -> Result<(), BusError> {
        self.begin(TransactionKind::Receive, &[], rx)
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), BusError> {
        if tx.len() != rx.len() {
            return Err(BusError::LengthMismatch {
                tx: tx.len(),
                rx: rx.len(),
            });
        }
        self.begin(TransactionKind::Transfer, tx, rx)
    }

    fn set_frame_width(&mut self, line: SelectLine, bytes: usize) -> Result<(), BusError> {
        if bytes == 0 || bytes > MAX_FRAME_WIDTH {
            return Err(BusError::UnsupportedFrameWidth(bytes));
        }
        debug!("Frame width on {} set to {} bytes", line, bytes);
        self.frame_widths.insert(line, bytes);
        Ok(())
    }
}
