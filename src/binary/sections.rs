//! Section identifiers and the top-level module parser.
//!
//! Sections are parsed in place; after each one the cursor must sit
//! exactly at the declared payload end. Custom, table, element, and data
//! sections are skipped whole; any other unsupported id is an error.

use crate::error::ParseError;
use crate::model::{
    ConstantExpression, Export, ExternalKind, FuncType, Global, Import, ImportDesc, Limits, Module,
};

use super::{
    code::read_code,
    cursor::Cursor,
    leb128,
    reader::{read_name, read_val_type, read_vec},
    Result,
};

// "\0asm" followed by version 1, both little-endian.
const WASM_MAGIC: u32 = 0x6D73_6100;
const WASM_VERSION: u32 = 1;

/// Standard section identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => SectionId::Custom,
            1 => SectionId::Type,
            2 => SectionId::Import,
            3 => SectionId::Function,
            4 => SectionId::Table,
            5 => SectionId::Memory,
            6 => SectionId::Global,
            7 => SectionId::Export,
            8 => SectionId::Start,
            9 => SectionId::Element,
            10 => SectionId::Code,
            11 => SectionId::Data,
            _ => return None,
        })
    }
}

/* ---------- Decoding helpers ---------- */

fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    let offset = cur.offset();
    match cur.read_u8()? {
        0x00 => Ok(Limits::new(leb128::read_uleb_u32(cur)?, None)),
        0x01 => {
            let min = leb128::read_uleb_u32(cur)?;
            let max = leb128::read_uleb_u32(cur)?;
            if max < min {
                return Err(ParseError::Malformed {
                    offset: cur.offset(),
                    msg: "limits maximum below minimum",
                });
            }
            Ok(Limits::new(min, Some(max)))
        }
        _ => Err(ParseError::Malformed {
            offset,
            msg: "invalid limits flag",
        }),
    }
}

fn read_func_type(cur: &mut Cursor) -> Result<FuncType> {
    let offset = cur.offset();
    if cur.read_u8()? != 0x60 {
        return Err(ParseError::Malformed {
            offset,
            msg: "expected functype prefix 0x60",
        });
    }
    let params = read_vec(cur, read_val_type)?;
    let results = read_vec(cur, read_val_type)?;
    if results.len() > 1 {
        return Err(ParseError::Unsupported {
            offset: cur.offset(),
            msg: "more than one function result",
        });
    }
    Ok(FuncType { params, results })
}

/// Read a global type, keeping only the mutability. The value type is
/// validated then dropped; slots are untyped 64-bit words at run time.
fn read_global_type(cur: &mut Cursor) -> Result<bool> {
    read_val_type(cur)?;
    let offset = cur.offset();
    match cur.read_u8()? {
        0x00 => Ok(false),
        0x01 => Ok(true),
        _ => Err(ParseError::Malformed {
            offset,
            msg: "invalid global mutability",
        }),
    }
}

/// Read an initializer expression: any run of the permitted opcodes
/// terminated by `end`; the last one wins.
fn read_constant_expression(cur: &mut Cursor) -> Result<ConstantExpression> {
    let mut result = None;
    loop {
        let offset = cur.offset();
        let opcode = cur.read_u8()?;
        match opcode {
            0x0B => break,
            0x23 => {
                result = Some(ConstantExpression::GlobalGet(leb128::read_uleb_u32(cur)?));
            }
            0x41 => {
                let value = leb128::read_sleb_i32(cur)?;
                result = Some(ConstantExpression::Constant(u64::from(value as u32)));
            }
            0x42 => {
                let value = leb128::read_sleb_i64(cur)?;
                result = Some(ConstantExpression::Constant(value as u64));
            }
            _ => return Err(ParseError::MalformedConstExpr { opcode, offset }),
        }
    }
    result.ok_or(ParseError::Malformed {
        offset: cur.offset(),
        msg: "empty constant expression",
    })
}

fn read_import(cur: &mut Cursor) -> Result<Import> {
    let module = read_name(cur)?;
    let name = read_name(cur)?;
    let offset = cur.offset();
    let desc = match cur.read_u8()? {
        0x00 => ImportDesc::Function(leb128::read_uleb_u32(cur)?),
        0x01 => {
            return Err(ParseError::Unsupported {
                offset,
                msg: "table import",
            })
        }
        0x02 => ImportDesc::Memory(read_limits(cur)?),
        0x03 => ImportDesc::Global {
            is_mutable: read_global_type(cur)?,
        },
        _ => {
            return Err(ParseError::Unsupported {
                offset,
                msg: "unknown import kind",
            })
        }
    };
    Ok(Import { module, name, desc })
}

fn read_export(cur: &mut Cursor) -> Result<Export> {
    let name = read_name(cur)?;
    let offset = cur.offset();
    let kind = match cur.read_u8()? {
        0x00 => ExternalKind::Function,
        0x01 => ExternalKind::Table,
        0x02 => ExternalKind::Memory,
        0x03 => ExternalKind::Global,
        _ => {
            return Err(ParseError::Unsupported {
                offset,
                msg: "unknown export kind",
            })
        }
    };
    let index = leb128::read_uleb_u32(cur)?;
    Ok(Export { name, kind, index })
}

fn read_global(cur: &mut Cursor) -> Result<Global> {
    let is_mutable = read_global_type(cur)?;
    let init = read_constant_expression(cur)?;
    Ok(Global { is_mutable, init })
}

/* ---------- Top-level module parser ---------- */

/// Parse a complete module from raw bytes.
pub fn parse_module(bytes: &[u8]) -> Result<Module> {
    let mut cur = Cursor::new(bytes);

    let magic = cur.read_u32_le().map_err(|_| ParseError::InvalidPrefix)?;
    let version = cur.read_u32_le().map_err(|_| ParseError::InvalidPrefix)?;
    if magic != WASM_MAGIC || version != WASM_VERSION {
        return Err(ParseError::InvalidPrefix);
    }

    let mut module = Module::default();

    while !cur.is_eof() {
        let id_offset = cur.offset();
        let id_byte = cur.read_u8()?;
        let id = SectionId::from_byte(id_byte).ok_or(ParseError::UnknownSection {
            id: id_byte,
            offset: id_offset,
        })?;
        let size = leb128::read_uleb_u32(&mut cur)? as usize;
        let expected_end = cur.offset() + size;

        match id {
            SectionId::Type => module.types = read_vec(&mut cur, read_func_type)?,
            SectionId::Import => module.imports = read_vec(&mut cur, read_import)?,
            SectionId::Function => {
                module.functions = read_vec(&mut cur, leb128::read_uleb_u32)?;
            }
            SectionId::Memory => {
                module.memories = read_vec(&mut cur, read_limits)?;
                if module.memories.len() > 1 {
                    return Err(ParseError::Malformed {
                        offset: id_offset,
                        msg: "more than one memory",
                    });
                }
            }
            SectionId::Global => module.globals = read_vec(&mut cur, read_global)?,
            SectionId::Export => module.exports = read_vec(&mut cur, read_export)?,
            SectionId::Start => module.start = Some(leb128::read_uleb_u32(&mut cur)?),
            SectionId::Code => module.codes = read_vec(&mut cur, read_code)?,
            SectionId::Custom | SectionId::Table | SectionId::Element | SectionId::Data => {
                cur.skip(size)?;
            }
        }

        if cur.offset() != expected_end {
            return Err(ParseError::SectionSizeMismatch {
                id: id_byte,
                offset: cur.offset(),
            });
        }
    }

    for imp in &module.imports {
        match imp.desc {
            ImportDesc::Function(_) => module.imported_function_count += 1,
            ImportDesc::Memory(_) => module.imported_memory_count += 1,
            ImportDesc::Global { .. } => module.imported_global_count += 1,
        }
    }

    if module.functions.len() != module.codes.len() {
        return Err(ParseError::Malformed {
            offset: 0,
            msg: "function and code section length mismatch",
        });
    }

    Ok(module)
}
