//! A live module instance: linear memory, global slots, and import
//! bindings, built by [`crate::instantiate`].

use std::rc::Rc;
use std::sync::Arc;

use crate::error::Trap;
use crate::host::HostFunc;
use crate::model::{GlobalIdx, Module, TypeIdx, Value};

use super::{global::GlobalSlot, memory::LinearMemory};

/// An instantiated module. Owns its memory and globals exclusively;
/// shares the decoded [`Module`] with any number of sibling instances.
///
/// All operations on an instance must be serialized by the embedder.
pub struct Instance {
    pub(crate) module: Arc<Module>,
    pub(crate) memory: LinearMemory,
    pub(crate) globals: Vec<GlobalSlot>,
    pub(crate) imported_functions: Vec<Rc<HostFunc>>,
    /// Declared type index of each imported function, in import order.
    pub(crate) imported_function_types: Vec<TypeIdx>,
}

impl Instance {
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Raw view of linear memory. Any slice taken here is invalidated by
    /// a `memory.grow` executed later.
    pub fn memory(&self) -> &[u8] {
        self.memory.data()
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut()
    }

    /// Current memory size in pages.
    pub fn memory_pages(&self) -> u32 {
        self.memory.size_pages()
    }

    /// Read the global at `idx` (unified index space, imports first).
    pub fn global_value(&self, idx: GlobalIdx) -> Option<Value> {
        self.globals.get(idx as usize).map(GlobalSlot::get)
    }

    /// Write the global at `idx`. Fails on immutable slots and
    /// out-of-range indices.
    pub fn set_global_value(&mut self, idx: GlobalIdx, value: Value) -> Result<(), Trap> {
        self.globals
            .get_mut(idx as usize)
            .ok_or(Trap::Internal("global index out of range"))?
            .set(value)
    }
}
