//! Unsigned little-endian base-128 varint codec (§4.A).
//!
//! Hand-rolled rather than delegated to a general LEB128 crate: the decode
//! error taxonomy (exact 10-byte cutoff, truncation mid-byte) is itself a
//! tested property of this component, not an implementation detail to hide
//! behind someone else's crate.

use bytes::Buf;

use crate::error::{FtdcError, Result};

/// Maximum number of bytes a varint may occupy. `ceil(64/7) == 10`.
const MAX_VARINT_BYTES: usize = 10;

/// Reads one unsigned varint from `src`, advancing past the bytes consumed.
///
/// Terminates at the first byte whose high bit is clear. An 11th
/// continuation byte, or running out of input mid-varint, is
/// `FtdcError::Corrupt` / `FtdcError::Truncated` respectively.
pub fn read_varint(src: &mut impl Buf) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    for _ in 0..MAX_VARINT_BYTES {
        if !src.has_remaining() {
            return Err(FtdcError::Truncated {
                context: "varint (continuation bit set, no more bytes)",
            });
        }
        let byte = src.get_u8();
        result |= u64::from(byte & 0x7F) << shift;

        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }

    Err(FtdcError::corrupt("varint exceeds 10 bytes"))
}

/// Encodes `value` as an unsigned varint. Length is always in
/// `{1,2,3,5,10}` for the boundary values exercised by the test suite.
pub fn write_varint(mut value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0u8];
    }

    let mut out = Vec::with_capacity(MAX_VARINT_BYTES);
    while value > 0 {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out
}

/// Reinterprets the unsigned varint bit pattern as a signed 64-bit delta.
/// Not zig-zag: this is a plain two's-complement reinterpretation.
pub fn varint_to_signed(value: u64) -> i64 {
    value as i64
}
