//! Byte offsets of every frame field

/// Thermocouple channels 0-3, 4 bytes each
pub const THERMOCOUPLES: usize = 0;
pub const THERMOCOUPLES_LEN: usize = 16;

/// Device A record: status + 4 data words + reserved
pub const DEVICE_A: usize = 16;
pub const DEVICE_A_LEN: usize = 18;

/// Device B record
pub const DEVICE_B: usize = 34;
pub const DEVICE_B_LEN: usize = 18;

/// Millisecond timestamps keep the low 24 bits
pub const MS_LEN: usize = 3;
/// Microsecond timestamps keep the low 16 bits
pub const US_LEN: usize = 2;

pub const THERMOCOUPLE_MS: usize = 52;
pub const THERMOCOUPLE_US: usize = 55;
pub const DEVICE_A_MS: usize = 57;
pub const DEVICE_A_US: usize = 60;
pub const DEVICE_B_MS: usize = 62;
pub const DEVICE_B_US: usize = 65;

/// Packet counter, 32-bit
pub const PACKET_COUNTER: usize = 67;
pub const PACKET_COUNTER_LEN: usize = 4;

/// Reserved fault/freshness flags
pub const FLAGS: usize = 71;
pub const FLAGS_LEN: usize = 1;

/// Total frame size
pub const FRAME_LEN: usize = 72;

// Fields are contiguous, in table order, and fill the frame exactly.
const _: () = {
    assert!(THERMOCOUPLES == 0);
    assert!(DEVICE_A == THERMOCOUPLES + THERMOCOUPLES_LEN);
    assert!(DEVICE_B == DEVICE_A + DEVICE_A_LEN);
    assert!(THERMOCOUPLE_MS == DEVICE_B + DEVICE_B_LEN);
    assert!(THERMOCOUPLE_US == THERMOCOUPLE_MS + MS_LEN);
    assert!(DEVICE_A_MS == THERMOCOUPLE_US + US_LEN);
    assert!(DEVICE_A_US == DEVICE_A_MS + MS_LEN);
    assert!(DEVICE_B_MS == DEVICE_A_US + US_LEN);
    assert!(DEVICE_B_US == DEVICE_B_MS + MS_LEN);
    assert!(PACKET_COUNTER == DEVICE_B_US + US_LEN);
    assert!(FLAGS == PACKET_COUNTER + PACKET_COUNTER_LEN);
    assert!(FRAME_LEN == FLAGS + FLAGS_LEN);
};
