//! The 8-bit checksum that the sync station expects at the end of every
//! command frame.
//!
//! The station computes it bit-serially, least significant bit first, with a
//! feedback constant of `0x8C`. That is the reflected form of polynomial
//! `0x31` with a zero initial value and no final xor, which is the
//! Dallas/Maxim CRC-8, so we borrow the table-driven implementation from
//! the [crc] crate.

use crc::{Crc, CRC_8_MAXIM_DOW};

/// Feedback constant used by the station firmware.
pub const CRC8_FEEDBACK: u8 = 0x8C;

/// The checksum algorithm used for command frames.
pub const SYNC_CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// Computes the checksum over the first `len` bytes of `bytes`. A `len`
/// longer than the slice is clamped to the slice.
pub fn crc8(bytes: &[u8], len: usize) -> u8 {
    let len = len.min(bytes.len());
    SYNC_CRC8.checksum(&bytes[..len])
}
