//! Visitor traits for streaming over a type
//!
//! A type is delivered as a sequence of events: one header, its fields, its
//! methods (each a nested stream of instructions), then an end event.
//! Transformation stages implement these traits and hold the next stage
//! explicitly, forwarding whatever they do not rewrite.

use crate::descriptor::CONSTRUCTOR_NAME;
use crate::image::access;
use crate::insn::{Insn, Label, TryCatchBlock};

/// Type header event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHeader {
    /// Access flags
    pub access: u16,
    /// Internal name
    pub name: String,
    /// Internal name of the super type, `None` for root types
    pub super_name: Option<String>,
}

impl TypeHeader {
    /// Check if the type is an interface
    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }
}

/// Field event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Access flags
    pub access: u16,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
}

/// Method event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Access flags
    pub access: u16,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
}

impl MethodInfo {
    /// Create a method event
    pub fn new(access: u16, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Check if this is a constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Check if this is a static method
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }

    /// Check if this method has no body
    pub fn is_abstract(&self) -> bool {
        self.access & access::ABSTRACT != 0
    }
}

/// Receives the instruction stream of one method
///
/// Calls arrive in order: `visit_code`, then any mix of `visit_try_catch` and
/// `visit_insn`, then `visit_end`. Labels must come from `new_label` on the
/// same visitor.
pub trait MethodVisitor {
    /// Allocate a fresh label
    fn new_label(&mut self) -> Label;

    /// Start of the method body
    fn visit_code(&mut self) {}

    /// Exception handler covering a label range
    fn visit_try_catch(&mut self, block: TryCatchBlock);

    /// One instruction or pseudo-instruction
    fn visit_insn(&mut self, insn: Insn);

    /// End of the method body
    fn visit_end(&mut self) {}
}

/// Receives the events of one type
pub trait TypeVisitor {
    /// Error reported when the type is finished
    type Error;

    /// Type header, always the first event
    fn visit_header(&mut self, header: &TypeHeader);

    /// One field
    fn visit_field(&mut self, field: &FieldInfo);

    /// One method; its instructions go to the returned visitor
    fn visit_method<'a>(&'a mut self, method: &MethodInfo) -> Box<dyn MethodVisitor + 'a>;

    /// End of the type
    fn visit_end(&mut self) -> Result<(), Self::Error>;
}

impl<M: MethodVisitor + ?Sized> MethodVisitor for &mut M {
    fn new_label(&mut self) -> Label {
        (**self).new_label()
    }

    fn visit_code(&mut self) {
        (**self).visit_code()
    }

    fn visit_try_catch(&mut self, block: TryCatchBlock) {
        (**self).visit_try_catch(block)
    }

    fn visit_insn(&mut self, insn: Insn) {
        (**self).visit_insn(insn)
    }

    fn visit_end(&mut self) {
        (**self).visit_end()
    }
}

impl<M: MethodVisitor + ?Sized> MethodVisitor for Box<M> {
    fn new_label(&mut self) -> Label {
        (**self).new_label()
    }

    fn visit_code(&mut self) {
        (**self).visit_code()
    }

    fn visit_try_catch(&mut self, block: TryCatchBlock) {
        (**self).visit_try_catch(block)
    }

    fn visit_insn(&mut self, insn: Insn) {
        (**self).visit_insn(insn)
    }

    fn visit_end(&mut self) {
        (**self).visit_end()
    }
}

impl<T: TypeVisitor + ?Sized> TypeVisitor for &mut T {
    type Error = T::Error;

    fn visit_header(&mut self, header: &TypeHeader) {
        (**self).visit_header(header)
    }

    fn visit_field(&mut self, field: &FieldInfo) {
        (**self).visit_field(field)
    }

    fn visit_method<'a>(&'a mut self, method: &MethodInfo) -> Box<dyn MethodVisitor + 'a> {
        (**self).visit_method(method)
    }

    fn visit_end(&mut self) -> Result<(), Self::Error> {
        (**self).visit_end()
    }
}

impl<T: TypeVisitor + ?Sized> TypeVisitor for Box<T> {
    type Error = T::Error;

    fn visit_header(&mut self, header: &TypeHeader) {
        (**self).visit_header(header)
    }

    fn visit_field(&mut self, field: &FieldInfo) {
        (**self).visit_field(field)
    }

    fn visit_method<'a>(&'a mut self, method: &MethodInfo) -> Box<dyn MethodVisitor + 'a> {
        (**self).visit_method(method)
    }

    fn visit_end(&mut self) -> Result<(), Self::Error> {
        (**self).visit_end()
    }
}
