//! Shared Serial Bus
//!
//! This crate defines the non-blocking bus primitives the acquisition core
//! is built on (select a device, check busy, receive, transfer) together
//! with a simulated bus for running the node without hardware.

mod bus;
mod delay;
mod error;
mod sim;

pub use bus::{SelectLine, SharedBus};
pub use delay::{Delay, StdDelay};
pub use error::BusError;
pub use sim::{SimulatedBus, Transaction, TransactionKind};

/// Bus framing constants
pub mod framing {
    /// Bytes a single transaction may carry before the controller ends the frame
    pub const DEFAULT_FRAME_WIDTH: usize = 4;
    /// Upper bound accepted by `SharedBus::set_frame_width`
    pub const MAX_FRAME_WIDTH: usize = 64;
    /// Number of addressable select lines
    pub const MAX_SELECT_LINES: u8 = 16;
}
