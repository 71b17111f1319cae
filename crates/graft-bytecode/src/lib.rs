//! Graft bytecode
//!
//! The compiled type representation used by the graft weaver: opcodes, the
//! constant pool, the binary type-image format, symbolic instructions with
//! labels and frames, descriptors, the visitor traits, the tree form, the
//! writer, a builder, a disassembler and the structural verifier.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod constants;
pub mod descriptor;
pub mod disasm;
pub mod encoder;
pub mod image;
pub mod insn;
pub mod node;
pub mod opcode;
pub mod verify;
pub mod visitor;
pub mod writer;

pub use builder::{MethodBuilder, TypeBuilder};
pub use constants::ConstantPool;
pub use descriptor::{DescriptorError, FieldType, MethodDescriptor};
pub use disasm::{disassemble, disassemble_method};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use image::{access, ImageError, TypeImage};
pub use insn::{Frame, Insn, Label, MemberRef, TryCatchBlock, VType};
pub use node::{MethodNode, TypeNode};
pub use opcode::Opcode;
pub use verify::{verify_method, verify_type, VerifyError};
pub use visitor::{FieldInfo, MethodInfo, MethodVisitor, TypeHeader, TypeVisitor};
pub use writer::TypeWriter;
