//! Symbolic instructions
//!
//! This is the form visitors see: branch targets are [`Label`]s instead of
//! code offsets, pool indices are resolved to names, and labels and
//! verification frames appear inline as pseudo-instructions.

use crate::descriptor::{DescriptorError, FieldType, MethodDescriptor, CONSTRUCTOR_NAME};
use crate::opcode::Opcode;
use std::fmt;

/// A position in a method's instruction stream
///
/// Label ids are only meaningful within the method visitor that allocated
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl Label {
    /// Numeric id of the label
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Symbolic reference to a field or method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Internal name of the declaring type
    pub owner: String,
    /// Member name
    pub name: String,
    /// Field or method descriptor
    pub descriptor: String,
}

impl MemberRef {
    /// Create a member reference
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Check if this references a constructor
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

/// Verification type of a local variable or stack slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VType {
    /// Unusable slot
    Top,
    /// Int category (ints and booleans)
    Int,
    /// The null reference
    Null,
    /// `this` inside a constructor before the super/sibling constructor ran
    UninitializedThis,
    /// Reference to an instance of the named type
    Object(String),
}

impl VType {
    /// Verification type of a descriptor type
    pub fn from_field_type(ty: &FieldType) -> Self {
        match ty {
            FieldType::Int | FieldType::Boolean => VType::Int,
            FieldType::Object(name) => VType::Object(name.clone()),
        }
    }

    /// Check if this is any kind of reference
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            VType::Null | VType::UninitializedThis | VType::Object(_)
        )
    }
}

impl fmt::Display for VType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VType::Top => f.write_str("top"),
            VType::Int => f.write_str("int"),
            VType::Null => f.write_str("null"),
            VType::UninitializedThis => f.write_str("uninitialized_this"),
            VType::Object(name) => f.write_str(name),
        }
    }
}

/// Declared operand-stack/local shape at a control-flow join point
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Frame {
    /// Locals of the previous frame, empty stack
    Same,
    /// Locals of the previous frame, exactly one stack item
    Same1(VType),
    /// Fully specified locals and stack
    Full {
        /// Local variable types
        locals: Vec<VType>,
        /// Operand stack types, bottom first
        stack: Vec<VType>,
    },
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |items: &[VType]| {
            items
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Frame::Same => f.write_str("FRAME SAME"),
            Frame::Same1(ty) => write!(f, "FRAME SAME1 [{}]", ty),
            Frame::Full { locals, stack } => {
                write!(f, "FRAME FULL [{}] [{}]", list(locals), list(stack))
            }
        }
    }
}

/// Exception handler covering `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TryCatchBlock {
    /// First protected instruction
    pub start: Label,
    /// First instruction after the protected range
    pub end: Label,
    /// Handler entry
    pub handler: Label,
    /// Caught type, `None` catches everything
    pub catch_type: Option<String>,
}

/// A symbolic instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Insn {
    /// No operation
    Nop,
    /// Pop top value
    Pop,
    /// Duplicate top value
    Dup,
    /// Swap top two values
    Swap,
    /// Push null
    AconstNull,
    /// Push an int
    Iconst(i32),
    /// Push a string literal
    Ldc(String),
    /// Load int local
    Iload(u16),
    /// Store int local
    Istore(u16),
    /// Load reference local
    Aload(u16),
    /// Store reference local
    Astore(u16),
    /// Int addition
    Iadd,
    /// Int subtraction
    Isub,
    /// Int multiplication
    Imul,
    /// Int division
    Idiv,
    /// Int negation
    Ineg,
    /// Unconditional jump
    Goto(Label),
    /// Jump if int is zero
    Ifeq(Label),
    /// Jump if int is non-zero
    Ifne(Label),
    /// Jump if reference is null
    Ifnull(Label),
    /// Jump if reference is not null
    Ifnonnull(Label),
    /// Void return
    Return,
    /// Int return
    Ireturn,
    /// Reference return
    Areturn,
    /// Throw
    Athrow,
    /// Read instance field
    Getfield(MemberRef),
    /// Write instance field
    Putfield(MemberRef),
    /// Read static field
    Getstatic(MemberRef),
    /// Write static field
    Putstatic(MemberRef),
    /// Virtual invocation
    Invokevirtual(MemberRef),
    /// Exact invocation
    Invokespecial(MemberRef),
    /// Static invocation
    Invokestatic(MemberRef),
    /// Allocate an instance
    New(String),
    /// Checked cast
    Checkcast(String),
    /// Instance test
    Instanceof(String),
    /// Pseudo-instruction: binds a label to the next real instruction
    Label(Label),
    /// Pseudo-instruction: declares the frame at the next real instruction
    Frame(Frame),
}

impl Insn {
    /// Opcode of a real instruction, `None` for pseudo-instructions
    pub fn opcode(&self) -> Option<Opcode> {
        let opcode = match self {
            Insn::Nop => Opcode::Nop,
            Insn::Pop => Opcode::Pop,
            Insn::Dup => Opcode::Dup,
            Insn::Swap => Opcode::Swap,
            Insn::AconstNull => Opcode::AconstNull,
            Insn::Iconst(_) => Opcode::Iconst,
            Insn::Ldc(_) => Opcode::Ldc,
            Insn::Iload(_) => Opcode::Iload,
            Insn::Istore(_) => Opcode::Istore,
            Insn::Aload(_) => Opcode::Aload,
            Insn::Astore(_) => Opcode::Astore,
            Insn::Iadd => Opcode::Iadd,
            Insn::Isub => Opcode::Isub,
            Insn::Imul => Opcode::Imul,
            Insn::Idiv => Opcode::Idiv,
            Insn::Ineg => Opcode::Ineg,
            Insn::Goto(_) => Opcode::Goto,
            Insn::Ifeq(_) => Opcode::Ifeq,
            Insn::Ifne(_) => Opcode::Ifne,
            Insn::Ifnull(_) => Opcode::Ifnull,
            Insn::Ifnonnull(_) => Opcode::Ifnonnull,
            Insn::Return => Opcode::Return,
            Insn::Ireturn => Opcode::Ireturn,
            Insn::Areturn => Opcode::Areturn,
            Insn::Athrow => Opcode::Athrow,
            Insn::Getfield(_) => Opcode::Getfield,
            Insn::Putfield(_) => Opcode::Putfield,
            Insn::Getstatic(_) => Opcode::Getstatic,
            Insn::Putstatic(_) => Opcode::Putstatic,
            Insn::Invokevirtual(_) => Opcode::Invokevirtual,
            Insn::Invokespecial(_) => Opcode::Invokespecial,
            Insn::Invokestatic(_) => Opcode::Invokestatic,
            Insn::New(_) => Opcode::New,
            Insn::Checkcast(_) => Opcode::Checkcast,
            Insn::Instanceof(_) => Opcode::Instanceof,
            Insn::Label(_) | Insn::Frame(_) => return None,
        };
        Some(opcode)
    }

    /// Check if this is a label or frame pseudo-instruction
    pub fn is_pseudo(&self) -> bool {
        matches!(self, Insn::Label(_) | Insn::Frame(_))
    }

    /// Encoded size in bytes (zero for pseudo-instructions)
    pub fn encoded_size(&self) -> usize {
        self.opcode().map_or(0, |op| 1 + op.operand_size())
    }

    /// Branch target of a jump instruction
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Insn::Goto(l) | Insn::Ifeq(l) | Insn::Ifne(l) | Insn::Ifnull(l) | Insn::Ifnonnull(l) => {
                Some(*l)
            }
            _ => None,
        }
    }

    /// Member operand of field and invoke instructions
    pub fn member(&self) -> Option<&MemberRef> {
        match self {
            Insn::Getfield(m)
            | Insn::Putfield(m)
            | Insn::Getstatic(m)
            | Insn::Putstatic(m)
            | Insn::Invokevirtual(m)
            | Insn::Invokespecial(m)
            | Insn::Invokestatic(m) => Some(m),
            _ => None,
        }
    }

    /// Rewrite every label this instruction mentions
    pub fn map_labels(self, mut f: impl FnMut(Label) -> Label) -> Insn {
        match self {
            Insn::Goto(l) => Insn::Goto(f(l)),
            Insn::Ifeq(l) => Insn::Ifeq(f(l)),
            Insn::Ifne(l) => Insn::Ifne(f(l)),
            Insn::Ifnull(l) => Insn::Ifnull(f(l)),
            Insn::Ifnonnull(l) => Insn::Ifnonnull(f(l)),
            Insn::Label(l) => Insn::Label(f(l)),
            other => other,
        }
    }

    /// Number of values popped and pushed
    pub fn stack_effect(&self) -> Result<(usize, usize), DescriptorError> {
        let effect = match self {
            Insn::Nop | Insn::Label(_) | Insn::Frame(_) | Insn::Goto(_) | Insn::Return => (0, 0),
            Insn::Pop | Insn::Istore(_) | Insn::Astore(_) => (1, 0),
            Insn::Dup => (1, 2),
            Insn::Swap => (2, 2),
            Insn::AconstNull | Insn::Iconst(_) | Insn::Ldc(_) | Insn::Iload(_) | Insn::Aload(_) => {
                (0, 1)
            }
            Insn::Iadd | Insn::Isub | Insn::Imul | Insn::Idiv => (2, 1),
            Insn::Ineg | Insn::Checkcast(_) | Insn::Instanceof(_) => (1, 1),
            Insn::Ifeq(_) | Insn::Ifne(_) | Insn::Ifnull(_) | Insn::Ifnonnull(_) => (1, 0),
            Insn::Ireturn | Insn::Areturn | Insn::Athrow => (1, 0),
            Insn::Getfield(_) => (1, 1),
            Insn::Putfield(_) => (2, 0),
            Insn::Getstatic(_) => (0, 1),
            Insn::Putstatic(_) => (1, 0),
            Insn::New(_) => (0, 1),
            Insn::Invokevirtual(m) | Insn::Invokespecial(m) => {
                let desc = MethodDescriptor::parse(&m.descriptor)?;
                (desc.arg_count() + 1, desc.ret.is_some() as usize)
            }
            Insn::Invokestatic(m) => {
                let desc = MethodDescriptor::parse(&m.descriptor)?;
                (desc.arg_count(), desc.ret.is_some() as usize)
            }
        };
        Ok(effect)
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Label(l) => write!(f, "{}:", l),
            Insn::Frame(frame) => write!(f, "{}", frame),
            Insn::Iconst(v) => write!(f, "ICONST {}", v),
            Insn::Ldc(s) => write!(f, "LDC {:?}", s),
            Insn::Iload(i) | Insn::Istore(i) | Insn::Aload(i) | Insn::Astore(i) => {
                write!(f, "{} {}", self.opcode().map_or("", |op| op.name()), i)
            }
            Insn::New(t) | Insn::Checkcast(t) | Insn::Instanceof(t) => {
                write!(f, "{} {}", self.opcode().map_or("", |op| op.name()), t)
            }
            other => {
                let name = other.opcode().map_or("", |op| op.name());
                if let Some(target) = other.jump_target() {
                    write!(f, "{} {}", name, target)
                } else if let Some(member) = other.member() {
                    write!(f, "{} {}", name, member)
                } else {
                    f.write_str(name)
                }
            }
        }
    }
}
