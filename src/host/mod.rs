//! Host-imported functions.

use crate::error::Trap;
use crate::model::Value;
use crate::runtime::Instance;

/// Host function callable from module code. At most one return value.
///
/// Runs synchronously on the caller's thread and may re-enter the engine
/// through [`crate::execute`]. `Err` is a trap and unwinds the calling
/// execution.
pub type HostFunc = dyn Fn(&mut Instance, &[Value]) -> Result<Option<Value>, Trap>;
