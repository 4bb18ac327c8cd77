//! ULEB128/SLEB128 decoding with strict canonical-form checks.
//!
//! An encoding is rejected when it runs past the byte limit for its
//! target width, when terminator bits beyond the target width are set,
//! or (signed forms) when the unused terminator bits disagree with the
//! sign bit. Zero padding within the byte limit is accepted.

use crate::error::ParseError;

use super::{cursor::Cursor, Result};

/// Decode an unsigned LEB128 as u32 (max 5 bytes).
pub fn read_uleb_u32(cur: &mut Cursor) -> Result<u32> {
    read_unsigned(cur, 32).map(|v| v as u32)
}

/// Decode an unsigned LEB128 as u64 (max 10 bytes).
pub fn read_uleb_u64(cur: &mut Cursor) -> Result<u64> {
    read_unsigned(cur, 64)
}

/// Decode a signed LEB128 as i32 (max 5 bytes).
pub fn read_sleb_i32(cur: &mut Cursor) -> Result<i32> {
    read_signed(cur, 32).map(|v| v as i32)
}

/// Decode a signed LEB128 as i64 (max 10 bytes).
pub fn read_sleb_i64(cur: &mut Cursor) -> Result<i64> {
    read_signed(cur, 64).map(|v| v as i64)
}

fn read_unsigned(cur: &mut Cursor, bits: u32) -> Result<u64> {
    let max_bytes = (bits + 6) / 7;
    let mut result: u64 = 0;

    for i in 0..max_bytes {
        let byte = cur.read_u8()?;
        let shift = i * 7;
        result |= u64::from(byte & 0x7F) << shift;

        if byte & 0x80 == 0 {
            // Terminator: payload bits past the target width must be clear.
            let width_left = bits - shift;
            if width_left < 7 && u64::from(byte) >> width_left != 0 {
                return Err(ParseError::Leb128NonCanonical {
                    offset: cur.offset(),
                });
            }
            return Ok(result);
        }
    }

    Err(ParseError::Leb128TooLong {
        offset: cur.offset(),
    })
}

fn read_signed(cur: &mut Cursor, bits: u32) -> Result<u64> {
    let max_bytes = (bits + 6) / 7;
    let mut result: u64 = 0;

    for i in 0..max_bytes {
        let byte = cur.read_u8()?;
        let shift = i * 7;
        result |= u64::from(byte & 0x7F) << shift;

        if byte & 0x80 == 0 {
            if shift + 7 < bits {
                // Non-boundary terminator: extend the payload's sign bit.
                if byte & 0x40 != 0 {
                    result |= u64::MAX << (shift + 7);
                }
            } else {
                // Terminator at the width boundary: unused payload bits
                // must all equal the sign bit.
                let width_left = bits - shift;
                let unused_mask = (0x7F_u8 << width_left) & 0x7F;
                let sign_set = (result >> (bits - 1)) & 1 == 1;
                let expected = if sign_set { unused_mask } else { 0 };
                if byte & unused_mask != expected {
                    return Err(ParseError::Leb128NonCanonical {
                        offset: cur.offset(),
                    });
                }
            }
            return Ok(result);
        }
    }

    Err(ParseError::Leb128TooLong {
        offset: cur.offset(),
    })
}
