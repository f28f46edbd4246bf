//! Front-end command words
//!
//! Every configuration transaction is one 3-byte word: command/opcode byte,
//! payload byte, padding.

use serde::{Deserialize, Serialize};

/// One 3-byte command/response word
pub type Command = [u8; 3];

/// Register write opcode (OR'd with the register address)
pub const WREG: u8 = 0x40;

/// Register addresses
pub mod addr {
    /// Analog system configuration
    pub const A_SYS_CFG: u8 = 0x0B;
    /// Digital system configuration
    pub const D_SYS_CFG: u8 = 0x0C;
    /// Clock source configuration
    pub const CLK1: u8 = 0x0D;
    /// Clock divider / oversampling configuration
    pub const CLK2: u8 = 0x0E;
    /// Channel enable
    pub const ADC_ENA: u8 = 0x0F;
}

/// Register values written during bring-up
pub mod value {
    /// Negative charge pump off, high-resolution mode, 2.442 V internal
    /// reference enabled, 5/95% comparator threshold
    pub const A_SYS_CFG: u8 = 0x68;
    /// Watchdog and CRC off, fixed six-word frame, minimum DONE/Hi-Z delays
    pub const D_SYS_CFG: u8 = 0x3C;
    /// Crystal clock source, CLKIN / 2
    pub const CLK1: u8 = 0x02;
    /// All four channels on (all-or-nothing)
    pub const ADC_ENA_ALL: u8 = 0x0F;
}

/// Null word, clocked out to read back the previous response
pub const NULL: Command = [0x00, 0x00, 0x00];

/// Unlock the register map for configuration
pub const UNLOCK: Command = [0x06, 0x55, 0x00];

/// Leave standby and start conversions
pub const WAKEUP: Command = [0x00, 0x33, 0x00];

/// Build a register write word
pub const fn write_register(address: u8, value: u8) -> Command {
    [WREG | address, value, 0x00]
}

/// Supported output data rates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleRatePreset {
    /// ICLK / 4, OSR 48: 42.667 kHz
    #[default]
    Khz42_667,
    /// ICLK / 4, OSR 256: 8 kHz
    Khz8,
}

impl SampleRatePreset {
    /// CLK2 register value for this preset
    pub const fn clk2_value(self) -> u8 {
        match self {
            Self::Khz42_667 => 0x4E,
            Self::Khz8 => 0x48,
        }
    }

    /// Nominal output data rate in Hz
    pub const fn hz(self) -> u32 {
        match self {
            Self::Khz42_667 => 42_667,
            Self::Khz8 => 8_000,
        }
    }
}
