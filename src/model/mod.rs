//! In-memory module representation shared by parser, instantiator, and
//! interpreter.

pub mod instr;
pub mod module;
pub mod types;

pub use instr::Instr;
pub use module::{Code, ConstantExpression, Global, Module};
pub use types::{
    Export, ExternalKind, FuncIdx, FuncType, GlobalIdx, Import, ImportDesc, Limits, TypeIdx,
    ValType, Value,
};
