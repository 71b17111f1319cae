//! Fluent construction of types
//!
//! Used by the runtime to define its built-in types and by tests to write
//! fixtures without hand-encoding images.
//!
//! ```
//! use graft_bytecode::{access, Insn, TypeBuilder};
//!
//! let bytes = TypeBuilder::new("demo/Answer")
//!     .method(access::PUBLIC | access::STATIC, "get", "()I", |m| {
//!         m.emit(Insn::Iconst(42)).emit(Insn::Ireturn);
//!     })
//!     .to_bytes()
//!     .unwrap();
//! assert_eq!(&bytes[..4], b"GRFT");
//! ```

use crate::descriptor::OBJECT;
use crate::image::{access, ImageError};
use crate::insn::{Frame, Insn, Label, TryCatchBlock};
use crate::node::{MethodNode, TypeNode};
use crate::visitor::{FieldInfo, MethodInfo, MethodVisitor, TypeHeader};

/// Builds a [`TypeNode`]
#[derive(Debug, Clone)]
pub struct TypeBuilder {
    node: TypeNode,
}

impl TypeBuilder {
    /// Start a public type extending `std/Object`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            node: TypeNode::new(TypeHeader {
                access: access::PUBLIC,
                name: name.into(),
                super_name: Some(OBJECT.to_string()),
            }),
        }
    }

    /// Replace the type's access flags
    pub fn access(mut self, access: u16) -> Self {
        self.node.header.access = access;
        self
    }

    /// Set the super type, `None` for a root type
    pub fn super_type(mut self, name: Option<&str>) -> Self {
        self.node.header.super_name = name.map(str::to_string);
        self
    }

    /// Add a field
    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.node.fields.push(FieldInfo {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        self
    }

    /// Add a method whose body is written by `body`
    pub fn method(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        body: impl FnOnce(&mut MethodBuilder),
    ) -> Self {
        let mut builder = MethodBuilder {
            node: MethodNode::new(MethodInfo::new(access, name, descriptor)),
        };
        body(&mut builder);
        self.node.methods.push(builder.node);
        self
    }

    /// Finish building
    pub fn build(self) -> TypeNode {
        self.node
    }

    /// Finish building and encode
    pub fn to_bytes(self) -> Result<Vec<u8>, ImageError> {
        self.node.to_bytes()
    }
}

/// Writes one method body
#[derive(Debug)]
pub struct MethodBuilder {
    node: MethodNode,
}

impl MethodBuilder {
    /// Allocate a label
    pub fn new_label(&mut self) -> Label {
        self.node.new_label()
    }

    /// Bind a label at the current position
    pub fn label(&mut self, label: Label) -> &mut Self {
        self.node.visit_insn(Insn::Label(label));
        self
    }

    /// Declare the frame at the current position
    pub fn frame(&mut self, frame: Frame) -> &mut Self {
        self.node.visit_insn(Insn::Frame(frame));
        self
    }

    /// Append an instruction
    pub fn emit(&mut self, insn: Insn) -> &mut Self {
        self.node.visit_insn(insn);
        self
    }

    /// Protect `[start, end)` with a handler at `handler`
    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.node.visit_try_catch(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_string),
        });
        self
    }
}
