//! Graft VM
//!
//! A small reference runtime for graft type images:
//! - loading with structural verification; rejected types never run
//! - an interpreter with managed exceptions and handler tables
//! - native hooks supplied by the host
//!
//! The weaver's tests use it to observe woven types actually running.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod object;
pub mod value;
pub mod vm;

pub use object::{Class, Handler, Method, Object, ObjectRef};
pub use value::Value;
pub use vm::{ClassRegistry, NativeFn, NativeRegistry, Vm, MAX_CALL_DEPTH, MESSAGE_FIELD};

use graft_bytecode::{ImageError, VerifyError};

/// VM errors
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    /// Call nesting exceeded [`MAX_CALL_DEPTH`]
    #[error("Stack overflow")]
    StackOverflow,

    /// Operand stack underflow
    #[error("Stack underflow")]
    StackUnderflow,

    /// Host call on a null or non-object value
    #[error("Null pointer exception")]
    NullPointer,

    /// Operand of the wrong kind
    #[error("Type error: {0}")]
    TypeError(String),

    /// Local slot out of range
    #[error("Invalid local slot {0}")]
    InvalidLocal(u16),

    /// Referenced type is not loaded
    #[error("Type {0} not found")]
    ClassNotFound(String),

    /// A type with this name is already loaded
    #[error("Type {0} is already loaded")]
    DuplicateType(String),

    /// No method with this name and descriptor up the hierarchy
    #[error("Method {owner}.{name}{descriptor} not found")]
    MethodNotFound {
        /// Type the lookup started from
        owner: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },

    /// Invoked method has no body
    #[error("Abstract method {0} invoked")]
    AbstractMethod(String),

    /// No such field
    #[error("Field {owner}.{name} not found")]
    FieldNotFound {
        /// Type the field was looked up in
        owner: String,
        /// Field name
        name: String,
    },

    /// Method body could not be prepared for execution
    #[error("Link error: {0}")]
    LinkError(String),

    /// Type image could not be decoded
    #[error("Failed to load type: {0}")]
    Image(#[from] ImageError),

    /// Type failed verification and was not loaded
    #[error("Type {name} failed verification: {source}")]
    Verify {
        /// Internal name of the rejected type
        name: String,
        /// Verifier error
        #[source]
        source: VerifyError,
    },

    /// A managed exception reached the host
    #[error("Uncaught {class}: {message}")]
    Uncaught {
        /// Runtime type of the exception
        class: String,
        /// Its message, `null` when unset
        message: String,
    },

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
