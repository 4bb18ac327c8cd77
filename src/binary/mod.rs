//! Binary module decoding: byte cursor, LEB128 and UTF-8 primitives,
//! section parsing, and the code-body pre-decoder.

pub mod code;
pub mod cursor;
pub mod leb128;
pub mod reader;
pub mod sections;
pub mod utf8;

/// Result alias for decoding operations.
pub type Result<T> = core::result::Result<T, crate::error::ParseError>;
