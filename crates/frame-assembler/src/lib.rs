//! Frame Assembler
//!
//! Packs the thermocouple and analog front-end buffers, three capture
//! timestamps and the packet counter into one fixed 72-byte frame.
//! Multi-byte numeric fields are big-endian.

mod frame;
pub mod offsets;

pub use frame::{Frame, FrameBytes, DEVICE_RECORD_BYTES, THERMOCOUPLE_CHANNELS, THERMOCOUPLE_BYTES};
pub use offsets::FRAME_LEN;
