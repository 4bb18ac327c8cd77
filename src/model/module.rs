//! Decoded module representation: section contents, function bodies, and
//! constant expressions. Immutable after parse; share between instances
//! behind an `Arc`.

use super::instr::Instr;
use super::types::{
    Export, FuncIdx, FuncType, GlobalIdx, Import, ImportDesc, Limits, TypeIdx, Value,
};

/// The restricted expression grammar allowed in global initializers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantExpression {
    /// A typed literal, already widened to the 64-bit slot representation.
    Constant(Value),
    /// The value of a previously declared imported global, sampled at
    /// instantiation time.
    GlobalGet(GlobalIdx),
}

/// A module-defined global: mutability plus its initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub is_mutable: bool,
    pub init: ConstantExpression,
}

/// A pre-decoded function body.
///
/// The instruction and immediate streams are parallel: each opcode's
/// immediates occupy a fixed number of little-endian bytes (4 for
/// indices, offsets and i32 literals, 8 for i64 literals), so the
/// interpreter advances both streams by static widths and never decodes
/// LEB128 at run time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Code {
    /// Number of declared locals (sum over local groups), excluding
    /// function parameters.
    pub local_count: u32,
    pub instructions: Vec<Instr>,
    pub immediates: Vec<u8>,
}

/// The decoded module. All vectors are in section order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type index of each module-defined function, parallel to `codes`.
    pub functions: Vec<TypeIdx>,
    /// At most one entry.
    pub memories: Vec<Limits>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<FuncIdx>,
    pub codes: Vec<Code>,

    // Per-kind import counts, precomputed while parsing the import
    // section, for index-space arithmetic.
    pub imported_function_count: u32,
    pub imported_global_count: u32,
    pub imported_memory_count: u32,
}

impl Module {
    /// Total function count: imports first, then defined functions.
    pub fn total_functions(&self) -> u32 {
        self.imported_function_count + self.functions.len() as u32
    }

    /// Total global count: imports first, then defined globals.
    pub fn total_globals(&self) -> u32 {
        self.imported_global_count + self.globals.len() as u32
    }

    /// Declared type indices of imported functions, in import order.
    pub fn imported_function_types(&self) -> impl Iterator<Item = TypeIdx> + '_ {
        self.imports.iter().filter_map(|imp| match imp.desc {
            ImportDesc::Function(type_idx) => Some(type_idx),
            _ => None,
        })
    }

    /// Signature of the function at `func_idx` in the unified index space
    /// (imports first, then defined functions).
    pub fn function_type(&self, func_idx: FuncIdx) -> Option<&FuncType> {
        let imported = self.imported_function_count;
        let type_idx = if func_idx < imported {
            self.imported_function_types().nth(func_idx as usize)?
        } else {
            *self.functions.get((func_idx - imported) as usize)?
        };
        self.types.get(type_idx as usize)
    }

    /// Body of the defined function at `func_idx` (unified index space).
    pub fn code(&self, func_idx: FuncIdx) -> Option<&Code> {
        let def_index = func_idx.checked_sub(self.imported_function_count)?;
        self.codes.get(def_index as usize)
    }
}
