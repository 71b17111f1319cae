//! Virtual machine execution and type loading

mod bootstrap;
mod interpreter;
mod registry;

pub use bootstrap::MESSAGE_FIELD;
pub use interpreter::{Vm, MAX_CALL_DEPTH};
pub use registry::{ClassRegistry, NativeFn, NativeRegistry};
