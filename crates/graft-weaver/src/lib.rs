//! Graft weaver
//!
//! Load-time transformation of graft type images:
//! - mixin composition: a donor type's fields and methods are copied into a
//!   target with every reference to the donor remapped to the target
//! - constructor rewriting: a mixin initializer runs exactly once per
//!   construction of the target
//! - advice wrapping: static advice called on method entry, each call behind
//!   a safety net that reports failures and resumes the method
//!
//! # Example
//!
//! ```
//! use graft_bytecode::{access, Insn, MemberRef, TypeBuilder};
//! use graft_weaver::{InMemoryResolver, MixinDescription, TransformPlan, Transformer, TypeDescriptor};
//! use std::sync::Arc;
//!
//! let donor = TypeBuilder::new("demo/Named")
//!     .field(access::PRIVATE, "name", "Lstd/String;")
//!     .to_bytes()
//!     .unwrap();
//! let target = TypeBuilder::new("demo/Widget")
//!     .method(access::PUBLIC, "<init>", "()V", |m| {
//!         m.emit(Insn::Aload(0))
//!             .emit(Insn::Invokespecial(MemberRef::new("std/Object", "<init>", "()V")))
//!             .emit(Insn::Return);
//!     })
//!     .to_bytes()
//!     .unwrap();
//!
//! let transformer = Transformer::new(Arc::new(InMemoryResolver::new().with("demo/Named", donor)));
//! let plan = TransformPlan::new().mixin(MixinDescription::new(TypeDescriptor::class("demo/Named")));
//! let woven = transformer.transform(&target, &plan).unwrap();
//! assert!(!woven.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod advice;
pub mod chain;
pub mod config;
pub mod constructor;
pub mod error;
pub mod mixin;
pub mod remap;
pub mod resolver;
pub mod safety_net;
pub mod transform;

pub use advice::{AdviceBinding, AdviceMethodVisitor, AdviceTypeVisitor};
pub use chain::MixinTypeVisitor;
pub use config::{ConfigError, SafetyNetConfig, WeaveConfig};
pub use constructor::ConstructorRewriter;
pub use error::WeaveError;
pub use mixin::{MixinComposer, MixinDescription, TypeDescriptor, TypeKind};
pub use remap::{RemappingMethodVisitor, SymbolRemapper};
pub use resolver::{
    DirectoryResolver, DonorResolver, FallbackResolver, InMemoryResolver, ResolveError,
    IMAGE_EXTENSION,
};
pub use safety_net::{SafetyNet, SafetyNetRegion, StackSize};
pub use transform::{TransformPlan, Transformer};
