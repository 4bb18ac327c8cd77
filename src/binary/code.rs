//! Function-body pre-decoder.
//!
//! Walks each body's expression once, validating opcodes and converting
//! every LEB128 immediate into a fixed-width little-endian slot. The
//! result is the pair of parallel streams in [`Code`]: the interpreter
//! advances through both by static widths and never re-parses LEB128.

use crate::error::ParseError;
use crate::model::{Code, Instr};

use super::{cursor::Cursor, leb128, reader::read_val_type, Result};

/// Read one size-prefixed function body.
pub fn read_code(cur: &mut Cursor) -> Result<Code> {
    let body_size = leb128::read_uleb_u32(cur)? as usize;
    let expected_end = cur.offset() + body_size;

    // Local groups: (count, valtype). Only the aggregate count survives;
    // every local slot is an untyped 64-bit word at run time.
    let group_count = leb128::read_uleb_u32(cur)?;
    let mut local_count: u64 = 0;
    for _ in 0..group_count {
        let count = leb128::read_uleb_u32(cur)?;
        read_val_type(cur)?;
        local_count += u64::from(count);
        if local_count > u64::from(u32::MAX) {
            return Err(ParseError::Malformed {
                offset: cur.offset(),
                msg: "local count overflows u32",
            });
        }
    }

    let mut instructions = Vec::new();
    let mut immediates = Vec::new();

    loop {
        let offset = cur.offset();
        let opcode = cur.read_u8()?;
        let instr =
            Instr::from_byte(opcode).ok_or(ParseError::UnsupportedInstr { opcode, offset })?;
        instructions.push(instr);

        match instr {
            Instr::LocalGet
            | Instr::LocalSet
            | Instr::LocalTee
            | Instr::GlobalGet
            | Instr::GlobalSet
            | Instr::Call => {
                let idx = leb128::read_uleb_u32(cur)?;
                immediates.extend_from_slice(&idx.to_le_bytes());
            }

            Instr::I32Const => {
                let value = leb128::read_sleb_i32(cur)?;
                immediates.extend_from_slice(&(value as u32).to_le_bytes());
            }
            Instr::I64Const => {
                let value = leb128::read_sleb_i64(cur)?;
                immediates.extend_from_slice(&(value as u64).to_le_bytes());
            }

            Instr::I32Load
            | Instr::I64Load
            | Instr::I32Load8S
            | Instr::I32Load8U
            | Instr::I32Load16S
            | Instr::I32Load16U
            | Instr::I64Load8S
            | Instr::I64Load8U
            | Instr::I64Load16S
            | Instr::I64Load16U
            | Instr::I64Load32S
            | Instr::I64Load32U
            | Instr::I32Store
            | Instr::I64Store
            | Instr::I32Store8
            | Instr::I32Store16
            | Instr::I64Store8
            | Instr::I64Store16
            | Instr::I64Store32 => {
                // Alignment hint is dropped; only the offset survives.
                leb128::read_uleb_u32(cur)?;
                let mem_offset = leb128::read_uleb_u32(cur)?;
                immediates.extend_from_slice(&mem_offset.to_le_bytes());
            }

            Instr::MemorySize | Instr::MemoryGrow => {
                if cur.read_u8()? != 0x00 {
                    return Err(ParseError::Malformed {
                        offset,
                        msg: "nonzero reserved byte after memory instruction",
                    });
                }
            }

            Instr::End => break,

            _ => {}
        }
    }

    if cur.offset() != expected_end {
        return Err(ParseError::Malformed {
            offset: cur.offset(),
            msg: "code body size mismatch",
        });
    }

    Ok(Code {
        local_count: local_count as u32,
        instructions,
        immediates,
    })
}
