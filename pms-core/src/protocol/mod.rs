pub mod command;
pub mod decoder;

// frame structure : marker(2) + length(2) + payload(length - 2) + checksum(2)

pub const START_MARKER_1: u8 = 0x42;
pub const START_MARKER_2: u8 = 0x4D;

/// Declared lengths of the 9-word and 13-word sensor variants.
/// A declared length covers the payload and the trailing checksum.
pub const SUPPORTED_FRAME_LENGTHS: [u16; 2] = [2 * 9 + 2, 2 * 13 + 2];

pub const HEADER_SIZE: usize = 4;
pub const CHECKSUM_SIZE: usize = 2;

/// Payload bytes of the largest supported frame.
pub const PAYLOAD_CAPACITY: usize = 2 * 13;

pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + PAYLOAD_CAPACITY + CHECKSUM_SIZE;

/// Sum of `bytes` in the protocol's 16-bit accumulator.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, &byte| acc.wrapping_add(u16::from(byte)))
}
