//! minwasm: a minimal embeddable engine for the WebAssembly MVP subset
//! with integer arithmetic, linear memory, mutable globals, and
//! host-imported functions/globals.
//!
//! Data flow: bytes → [`parse`] → [`Module`] → [`instantiate`] (+ host
//! imports) → [`Instance`] → [`execute`].

pub mod binary;
pub mod error;
pub mod host;
pub mod model;
pub mod runtime;
pub mod vm;

use std::rc::Rc;
use std::sync::Arc;

use model::{ConstantExpression, ExternalKind, ImportDesc, Limits, TypeIdx};
use runtime::{GlobalSlot, LinearMemory, MEMORY_PAGES_CEILING};

pub use error::{InstantiateError, ParseError, Trap};
pub use host::HostFunc;
pub use model::{FuncIdx, GlobalIdx, Module, Value};
pub use runtime::{ImportedGlobal, Instance};
pub use vm::execute;

/// Parse a binary module into its immutable decoded representation.
pub fn parse(bytes: &[u8]) -> Result<Module, ParseError> {
    binary::sections::parse_module(bytes)
}

/// Instantiate a module against host-supplied imports.
///
/// `imported_functions` and `imported_globals` must match the module's
/// import section restricted to each kind, in declaration order. A trap
/// in the start function discards the partially built instance.
pub fn instantiate(
    module: Arc<Module>,
    imported_functions: Vec<Rc<HostFunc>>,
    imported_globals: Vec<ImportedGlobal>,
) -> Result<Instance, InstantiateError> {
    // 1) Imported functions: arity of the supplied sequence must match
    // the import section, and declared type indices must resolve.
    let declared = module.imported_function_count as usize;
    if imported_functions.len() != declared {
        return Err(InstantiateError::FunctionImportMismatch {
            declared,
            supplied: imported_functions.len(),
        });
    }
    let imported_function_types: Vec<TypeIdx> = module.imported_function_types().collect();
    for &type_idx in &imported_function_types {
        if module.types.get(type_idx as usize).is_none() {
            return Err(InstantiateError::UnknownTypeIndex(type_idx));
        }
    }

    // 2) Globals: external-backed slots for imports (mutability must
    // agree), then defined globals with evaluated initializers.
    let declared_globals: Vec<bool> = module
        .imports
        .iter()
        .filter_map(|imp| match imp.desc {
            ImportDesc::Global { is_mutable } => Some(is_mutable),
            _ => None,
        })
        .collect();
    if imported_globals.len() != declared_globals.len() {
        return Err(InstantiateError::GlobalImportMismatch {
            declared: declared_globals.len(),
            supplied: imported_globals.len(),
        });
    }

    let mut globals: Vec<GlobalSlot> = Vec::with_capacity(module.total_globals() as usize);
    for (index, (supplied, &declared_mutable)) in
        imported_globals.into_iter().zip(&declared_globals).enumerate()
    {
        if supplied.is_mutable != declared_mutable {
            return Err(InstantiateError::GlobalMutabilityMismatch {
                index: index as u32,
            });
        }
        globals.push(GlobalSlot::External(supplied));
    }

    let imported_global_count = declared_globals.len() as u32;
    for global in &module.globals {
        let value = match global.init {
            ConstantExpression::Constant(v) => v,
            // Only previously declared imported globals may be
            // referenced; the value is sampled now.
            ConstantExpression::GlobalGet(idx) => {
                if idx >= imported_global_count {
                    return Err(InstantiateError::InvalidGlobalInitializer(idx));
                }
                globals[idx as usize].get()
            }
        };
        globals.push(GlobalSlot::Owned {
            value,
            is_mutable: global.is_mutable,
        });
    }

    // 3) Memory: defined or imported limits (the API supplies no host
    // memory, so an imported memory is allocated from its declaration).
    let mut memory_limits: Option<&Limits> = None;
    for imp in &module.imports {
        if let ImportDesc::Memory(limits) = &imp.desc {
            if memory_limits.replace(limits).is_some() {
                return Err(InstantiateError::MultipleMemories);
            }
        }
    }
    for limits in &module.memories {
        if memory_limits.replace(limits).is_some() {
            return Err(InstantiateError::MultipleMemories);
        }
    }
    let memory = match memory_limits {
        Some(limits) => {
            if limits.min > MEMORY_PAGES_CEILING {
                return Err(InstantiateError::MemoryLimitsExceeded(MEMORY_PAGES_CEILING));
            }
            LinearMemory::new(limits)
        }
        None => LinearMemory::empty(),
    };

    let mut instance = Instance {
        module: Arc::clone(&module),
        memory,
        globals,
        imported_functions,
        imported_function_types,
    };

    // 4) Start function.
    if let Some(start) = module.start {
        if start >= module.total_functions() {
            return Err(InstantiateError::StartFunctionOutOfRange(start));
        }
        if let Err(trap) = execute(&mut instance, start, &[]) {
            return Err(InstantiateError::StartFunctionTrapped(trap));
        }
    }

    Ok(instance)
}

/// Find an exported function index by name.
pub fn find_exported_function(module: &Module, name: &str) -> Option<FuncIdx> {
    module
        .exports
        .iter()
        .find(|e| e.kind == ExternalKind::Function && e.name == name)
        .map(|e| e.index)
}

/// Handle to an exported global: its index in the instance's unified
/// global index space plus its mutability. Read and write the slot with
/// [`Instance::global_value`] and [`Instance::set_global_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportedGlobal {
    pub index: GlobalIdx,
    pub is_mutable: bool,
}

/// Find an exported global by name.
pub fn find_exported_global(instance: &Instance, name: &str) -> Option<ExportedGlobal> {
    let export = instance
        .module
        .exports
        .iter()
        .find(|e| e.kind == ExternalKind::Global && e.name == name)?;
    let slot = instance.globals.get(export.index as usize)?;
    Some(ExportedGlobal {
        index: export.index,
        is_mutable: slot.is_mutable(),
    })
}
