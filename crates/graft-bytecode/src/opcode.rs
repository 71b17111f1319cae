//! Opcodes of the graft instruction set
//!
//! Opcodes are organized into categories:
//! - 0x00-0x0F: Stack manipulation & constants
//! - 0x10-0x1F: Local variables
//! - 0x20-0x2F: Integer arithmetic
//! - 0x30-0x3F: Control flow
//! - 0x40-0x4F: Returns and throw
//! - 0x50-0x5F: Field access
//! - 0x60-0x6F: Invocation
//! - 0x70-0x7F: Object and type operations

/// Bytecode opcode enumeration
///
/// All opcodes are single-byte instructions. Some opcodes take operands that
/// follow the opcode byte in the code stream.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,
    /// Swap top two stack values
    Swap = 0x03,
    /// Push null reference
    AconstNull = 0x04,
    /// Push 32-bit integer (operand: i32)
    Iconst = 0x05,
    /// Push string constant from pool (operand: u32 string index)
    Ldc = 0x06,

    // ===== Local Variables (0x10-0x1F) =====
    /// Load int local (operand: u16 index)
    Iload = 0x10,
    /// Store int local (operand: u16 index)
    Istore = 0x11,
    /// Load reference local (operand: u16 index)
    Aload = 0x12,
    /// Store reference local (operand: u16 index)
    Astore = 0x13,

    // ===== Integer Arithmetic (0x20-0x2F) =====
    /// pop b, pop a, push a + b
    Iadd = 0x20,
    /// pop b, pop a, push a - b
    Isub = 0x21,
    /// pop b, pop a, push a * b
    Imul = 0x22,
    /// pop b, pop a, push a / b (throws on zero divisor)
    Idiv = 0x23,
    /// pop a, push -a
    Ineg = 0x24,

    // ===== Control Flow (0x30-0x3F) =====
    /// Unconditional jump (operand: u32 absolute code offset)
    Goto = 0x30,
    /// Pop int, jump if zero
    Ifeq = 0x31,
    /// Pop int, jump if non-zero
    Ifne = 0x32,
    /// Pop reference, jump if null
    Ifnull = 0x33,
    /// Pop reference, jump if not null
    Ifnonnull = 0x34,

    // ===== Returns (0x40-0x4F) =====
    /// Return from a void method
    Return = 0x40,
    /// Return an int
    Ireturn = 0x41,
    /// Return a reference
    Areturn = 0x42,
    /// Throw the reference on top of the stack
    Athrow = 0x43,

    // ===== Field Access (0x50-0x5F) =====
    /// Read an instance field (operand: u32 member index)
    Getfield = 0x50,
    /// Write an instance field (operand: u32 member index)
    Putfield = 0x51,
    /// Read a static field (operand: u32 member index)
    Getstatic = 0x52,
    /// Write a static field (operand: u32 member index)
    Putstatic = 0x53,

    // ===== Invocation (0x60-0x6F) =====
    /// Virtual dispatch on the receiver (operand: u32 member index)
    Invokevirtual = 0x60,
    /// Exact dispatch: constructors and private methods (operand: u32 member index)
    Invokespecial = 0x61,
    /// Static call (operand: u32 member index)
    Invokestatic = 0x62,

    // ===== Objects & Types (0x70-0x7F) =====
    /// Allocate an instance (operand: u32 type name index)
    New = 0x70,
    /// Checked reference cast (operand: u32 type name index)
    Checkcast = 0x71,
    /// Push 1 if the reference is an instance of the type (operand: u32 type name index)
    Instanceof = 0x72,
}

impl Opcode {
    /// Convert a byte to an opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        let opcode = match byte {
            0x00 => Self::Nop,
            0x01 => Self::Pop,
            0x02 => Self::Dup,
            0x03 => Self::Swap,
            0x04 => Self::AconstNull,
            0x05 => Self::Iconst,
            0x06 => Self::Ldc,
            0x10 => Self::Iload,
            0x11 => Self::Istore,
            0x12 => Self::Aload,
            0x13 => Self::Astore,
            0x20 => Self::Iadd,
            0x21 => Self::Isub,
            0x22 => Self::Imul,
            0x23 => Self::Idiv,
            0x24 => Self::Ineg,
            0x30 => Self::Goto,
            0x31 => Self::Ifeq,
            0x32 => Self::Ifne,
            0x33 => Self::Ifnull,
            0x34 => Self::Ifnonnull,
            0x40 => Self::Return,
            0x41 => Self::Ireturn,
            0x42 => Self::Areturn,
            0x43 => Self::Athrow,
            0x50 => Self::Getfield,
            0x51 => Self::Putfield,
            0x52 => Self::Getstatic,
            0x53 => Self::Putstatic,
            0x60 => Self::Invokevirtual,
            0x61 => Self::Invokespecial,
            0x62 => Self::Invokestatic,
            0x70 => Self::New,
            0x71 => Self::Checkcast,
            0x72 => Self::Instanceof,
            _ => return None,
        };
        Some(opcode)
    }

    /// Convert opcode to its byte value
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Mnemonic used by the disassembler
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Pop => "POP",
            Self::Dup => "DUP",
            Self::Swap => "SWAP",
            Self::AconstNull => "ACONST_NULL",
            Self::Iconst => "ICONST",
            Self::Ldc => "LDC",
            Self::Iload => "ILOAD",
            Self::Istore => "ISTORE",
            Self::Aload => "ALOAD",
            Self::Astore => "ASTORE",
            Self::Iadd => "IADD",
            Self::Isub => "ISUB",
            Self::Imul => "IMUL",
            Self::Idiv => "IDIV",
            Self::Ineg => "INEG",
            Self::Goto => "GOTO",
            Self::Ifeq => "IFEQ",
            Self::Ifne => "IFNE",
            Self::Ifnull => "IFNULL",
            Self::Ifnonnull => "IFNONNULL",
            Self::Return => "RETURN",
            Self::Ireturn => "IRETURN",
            Self::Areturn => "ARETURN",
            Self::Athrow => "ATHROW",
            Self::Getfield => "GETFIELD",
            Self::Putfield => "PUTFIELD",
            Self::Getstatic => "GETSTATIC",
            Self::Putstatic => "PUTSTATIC",
            Self::Invokevirtual => "INVOKEVIRTUAL",
            Self::Invokespecial => "INVOKESPECIAL",
            Self::Invokestatic => "INVOKESTATIC",
            Self::New => "NEW",
            Self::Checkcast => "CHECKCAST",
            Self::Instanceof => "INSTANCEOF",
        }
    }

    /// Size in bytes of the operands following the opcode byte
    pub fn operand_size(self) -> usize {
        match self {
            Self::Iload | Self::Istore | Self::Aload | Self::Astore => 2,
            Self::Iconst
            | Self::Ldc
            | Self::Goto
            | Self::Ifeq
            | Self::Ifne
            | Self::Ifnull
            | Self::Ifnonnull
            | Self::Getfield
            | Self::Putfield
            | Self::Getstatic
            | Self::Putstatic
            | Self::Invokevirtual
            | Self::Invokespecial
            | Self::Invokestatic
            | Self::New
            | Self::Checkcast
            | Self::Instanceof => 4,
            _ => 0,
        }
    }

    /// Check if this opcode is a jump instruction
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Goto | Self::Ifeq | Self::Ifne | Self::Ifnull | Self::Ifnonnull
        )
    }

    /// Check if this opcode is a conditional jump
    pub fn is_conditional_jump(self) -> bool {
        self.is_jump() && self != Self::Goto
    }

    /// Check if this opcode is an invocation
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Self::Invokevirtual | Self::Invokespecial | Self::Invokestatic
        )
    }

    /// Check if this opcode returns normally from the method
    pub fn is_return(self) -> bool {
        matches!(self, Self::Return | Self::Ireturn | Self::Areturn)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return() || matches!(self, Self::Goto | Self::Athrow)
    }
}
