//! Frame record and byte encoding

use crate::offsets::*;
use event_signals::TimestampPair;

/// Thermocouple channels carried per frame
pub const THERMOCOUPLE_CHANNELS: usize = 4;
/// Raw bytes per thermocouple channel
pub const THERMOCOUPLE_BYTES: usize = 4;
/// Raw bytes per analog front-end record
pub const DEVICE_RECORD_BYTES: usize = DEVICE_A_LEN;

/// Encoded frame
pub type FrameBytes = [u8; FRAME_LEN];

const _: () = assert!(THERMOCOUPLE_CHANNELS * THERMOCOUPLE_BYTES == THERMOCOUPLES_LEN);
const _: () = assert!(DEVICE_A_LEN == DEVICE_B_LEN);

/// One transmit cycle's worth of acquisition data.
///
/// Built from scratch every cycle; nothing but `packet_counter` carries
/// over between frames. Field contents are copied verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub thermocouples: [[u8; THERMOCOUPLE_BYTES]; THERMOCOUPLE_CHANNELS],
    pub device_a: [u8; DEVICE_RECORD_BYTES],
    pub device_b: [u8; DEVICE_RECORD_BYTES],
    pub thermocouple_time: TimestampPair,
    pub device_a_time: TimestampPair,
    pub device_b_time: TimestampPair,
    pub packet_counter: u32,
    /// Reserved; always written as zero by the node
    pub flags: u8,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            thermocouples: [[0; THERMOCOUPLE_BYTES]; THERMOCOUPLE_CHANNELS],
            device_a: [0; DEVICE_RECORD_BYTES],
            device_b: [0; DEVICE_RECORD_BYTES],
            thermocouple_time: TimestampPair::default(),
            device_a_time: TimestampPair::default(),
            device_b_time: TimestampPair::default(),
            packet_counter: 0,
            flags: 0,
        }
    }
}

impl Frame {
    /// Write the frame into `out` at the fixed offsets
    pub fn encode_into(&self, out: &mut FrameBytes) {
        for (ch, raw) in self.thermocouples.iter().enumerate() {
            let start = THERMOCOUPLES + ch * THERMOCOUPLE_BYTES;
            out[start..start + THERMOCOUPLE_BYTES].copy_from_slice(raw);
        }
        out[DEVICE_A..DEVICE_A + DEVICE_A_LEN].copy_from_slice(&self.device_a);
        out[DEVICE_B..DEVICE_B + DEVICE_B_LEN].copy_from_slice(&self.device_b);

        put_stamp(out, THERMOCOUPLE_MS, THERMOCOUPLE_US, self.thermocouple_time);
        put_stamp(out, DEVICE_A_MS, DEVICE_A_US, self.device_a_time);
        put_stamp(out, DEVICE_B_MS, DEVICE_B_US, self.device_b_time);

        out[PACKET_COUNTER..PACKET_COUNTER + PACKET_COUNTER_LEN]
            .copy_from_slice(&self.packet_counter.to_be_bytes());
        out[FLAGS] = self.flags;
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> FrameBytes {
        let mut out = [0u8; FRAME_LEN];
        self.encode_into(&mut out);
        out
    }

    /// Parse an encoded frame.
    ///
    /// Timestamps come back truncated to the widths carried on the wire.
    pub fn decode(bytes: &FrameBytes) -> Self {
        let mut frame = Frame::default();
        for (ch, raw) in frame.thermocouples.iter_mut().enumerate() {
            let start = THERMOCOUPLES + ch * THERMOCOUPLE_BYTES;
            raw.copy_from_slice(&bytes[start..start + THERMOCOUPLE_BYTES]);
        }
        frame
            .device_a
            .copy_from_slice(&bytes[DEVICE_A..DEVICE_A + DEVICE_A_LEN]);
        frame
            .device_b
            .copy_from_slice(&bytes[DEVICE_B..DEVICE_B + DEVICE_B_LEN]);

        frame.thermocouple_time = get_stamp(bytes, THERMOCOUPLE_MS, THERMOCOUPLE_US);
        frame.device_a_time = get_stamp(bytes, DEVICE_A_MS, DEVICE_A_US);
        frame.device_b_time = get_stamp(bytes, DEVICE_B_MS, DEVICE_B_US);

        let mut counter = [0u8; PACKET_COUNTER_LEN];
        counter.copy_from_slice(&bytes[PACKET_COUNTER..PACKET_COUNTER + PACKET_COUNTER_LEN]);
        frame.packet_counter = u32::from_be_bytes(counter);
        frame.flags = bytes[FLAGS];
        frame
    }
}

fn put_stamp(out: &mut FrameBytes, ms_at: usize, us_at: usize, stamp: TimestampPair) {
    // low 24 bits of ms, low 16 bits of us
    out[ms_at..ms_at + MS_LEN].copy_from_slice(&stamp.ms.to_be_bytes()[1..]);
    out[us_at..us_at + US_LEN].copy_from_slice(&(stamp.us as u16).to_be_bytes());
}

fn get_stamp(bytes: &FrameBytes, ms_at: usize, us_at: usize) -> TimestampPair {
    let ms = u32::from_be_bytes([0, bytes[ms_at], bytes[ms_at + 1], bytes[ms_at + 2]]);
    let us = u16::from_be_bytes([bytes[us_at], bytes[us_at + 1]]);
    TimestampPair::new(ms, u32::from(us))
}
