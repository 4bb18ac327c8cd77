//! Crate-level error types: parse-time, instantiate-time, and runtime traps.

use thiserror::Error;

/// Static defect in the binary module. The module is unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("invalid wasm module prefix")]
    InvalidPrefix,

    #[error("unknown section id {id} at offset {offset}")]
    UnknownSection { id: u8, offset: usize },

    #[error("section {id} payload size mismatch at offset {offset}")]
    SectionSizeMismatch { id: u8, offset: usize },

    #[error("invalid LEB128 encoding at offset {offset}: too many bytes")]
    Leb128TooLong { offset: usize },

    #[error("invalid LEB128 encoding at offset {offset}: unused bits set")]
    Leb128NonCanonical { offset: usize },

    #[error("malformed UTF-8 name at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("unsupported instruction 0x{opcode:02x} at offset {offset}")]
    UnsupportedInstr { opcode: u8, offset: usize },

    #[error("unexpected instruction 0x{opcode:02x} in constant expression at offset {offset}")]
    MalformedConstExpr { opcode: u8, offset: usize },

    #[error("unsupported at offset {offset}: {msg}")]
    Unsupported { offset: usize, msg: &'static str },

    #[error("malformed module at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}

/// Failure to build an Instance from a Module and host imports.
/// No instance is exposed on failure.
#[derive(Debug, Error)]
pub enum InstantiateError {
    #[error("module imports {declared} functions, host supplied {supplied}")]
    FunctionImportMismatch { declared: usize, supplied: usize },

    #[error("module imports {declared} globals, host supplied {supplied}")]
    GlobalImportMismatch { declared: usize, supplied: usize },

    #[error("imported global {index} mutability mismatch")]
    GlobalMutabilityMismatch { index: u32 },

    #[error("import references unknown type index {0}")]
    UnknownTypeIndex(u32),

    #[error("module declares more than one memory")]
    MultipleMemories,

    #[error("memory limits exceed the {0}-page engine ceiling")]
    MemoryLimitsExceeded(u32),

    #[error("global initializer references global {0}, which is not a previously imported global")]
    InvalidGlobalInitializer(u32),

    #[error("start function index {0} out of range")]
    StartFunctionOutOfRange(u32),

    #[error("start function trapped")]
    StartFunctionTrapped(#[source] Trap),
}

/// Non-resumable runtime fault. Unwinds every frame of the current
/// execution and surfaces to the outermost caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Trap {
    #[error("unreachable instruction executed")]
    Unreachable,

    #[error("out-of-bounds memory access")]
    MemoryAccessOutOfBounds,

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    IntegerOverflow,

    #[error("call stack exhausted")]
    CallStackExhausted,

    #[error("operand stack exhausted")]
    OperandStackExhausted,

    #[error("host function trapped: {0}")]
    Host(&'static str),

    /// State only reachable through unvalidated bytecode (stack underflow,
    /// out-of-range indices, writes to immutable globals). Execution fails
    /// gracefully instead of panicking.
    #[error("internal fault: {0}")]
    Internal(&'static str),
}
