//! Per-device state

use crate::regs::{Command, SampleRatePreset};
use crate::{AdcRecord, DATA_CHANNELS, RECORD_BYTES, WORD_BYTES};
use serde::{Deserialize, Serialize};
use spi_bus::SelectLine;
use std::fmt;

/// Which of the two front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceId {
    /// First front end (bring-up and priority order first)
    A,
    /// Second front end
    B,
}

impl DeviceId {
    /// Both devices in bring-up order
    pub const ALL: [DeviceId; 2] = [DeviceId::A, DeviceId::B];

    pub(crate) fn index(self) -> usize {
        match self {
            DeviceId::A => 0,
            DeviceId::B => 1,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::A => write!(f, "A"),
            DeviceId::B => write!(f, "B"),
        }
    }
}

/// Static configuration of one front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontEndConfig {
    /// Bus-select line of the device
    pub line: SelectLine,
    /// Output data rate
    pub sample_rate: SampleRatePreset,
}

/// One bring-up transaction: what was sent, what came back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackEntry {
    pub command: Command,
    pub response: Command,
}

/// Every transaction of a device's bring-up, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BringUpReport {
    entries: Vec<ReadbackEntry>,
}

impl BringUpReport {
    pub(crate) fn record(&mut self, command: Command, response: Command) {
        self.entries.push(ReadbackEntry { command, response });
    }

    /// Recorded transactions
    pub fn entries(&self) -> &[ReadbackEntry] {
        &self.entries
    }

    /// Commands sent, in order
    pub fn commands(&self) -> impl Iterator<Item = Command> + '_ {
        self.entries.iter().map(|e| e.command)
    }
}

/// One analog front end and the buffer it owns
#[derive(Debug)]
pub struct AdcFrontEnd {
    device: DeviceId,
    config: FrontEndConfig,
    buffer: AdcRecord,
    report: BringUpReport,
    streaming: bool,
    transfers: u32,
}

impl AdcFrontEnd {
    pub(crate) fn new(device: DeviceId, config: FrontEndConfig) -> Self {
        Self {
            device,
            config,
            buffer: [0; RECORD_BYTES],
            report: BringUpReport::default(),
            streaming: false,
            transfers: 0,
        }
    }

    /// Device identity
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Static configuration
    pub fn config(&self) -> &FrontEndConfig {
        &self.config
    }

    /// Latest raw record
    pub fn buffer(&self) -> &AdcRecord {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut AdcRecord {
        &mut self.buffer
    }

    /// Raw 3-byte word at `index` (0 = status, 1..=4 = data, 5 = reserved)
    pub fn word(&self, index: usize) -> Option<[u8; WORD_BYTES]> {
        if index > DATA_CHANNELS + 1 {
            return None;
        }
        let start = index * WORD_BYTES;
        let mut word = [0u8; WORD_BYTES];
        word.copy_from_slice(&self.buffer[start..start + WORD_BYTES]);
        Some(word)
    }

    /// Bring-up transcript
    pub fn report(&self) -> &BringUpReport {
        &self.report
    }

    pub(crate) fn report_mut(&mut self) -> &mut BringUpReport {
        &mut self.report
    }

    /// Whether the device has been woken and the full-width frame set
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub(crate) fn set_streaming(&mut self) {
        self.streaming = true;
    }

    /// Completed steady-state transfers (wraps)
    pub fn transfers(&self) -> u32 {
        self.transfers
    }

    pub(crate) fn count_transfer(&mut self) {
        self.transfers = self.transfers.wrapping_add(1);
    }
}
