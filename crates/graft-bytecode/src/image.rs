//! Type image format
//!
//! A type image is the compiled, binary form of one type: its header, fields
//! and methods, with method bodies as encoded instruction streams. Names,
//! descriptors and literals live in the image's [`ConstantPool`].

use crate::constants::ConstantPool;
use crate::descriptor::DescriptorError;
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::insn::Label;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Magic number for type images: "GRFT"
pub const MAGIC: [u8; 4] = *b"GRFT";

/// Current image version
pub const VERSION: u32 = 1;

/// Magic + version + crc32 + sha256
const HEADER_SIZE: usize = 4 + 4 + 4 + 32;

/// Marks an absent pool index (no super type, catch-all handler)
pub const NO_INDEX: u32 = 0xFFFF_FFFF;

/// Access flags for types and members
pub mod access {
    /// Visible everywhere
    pub const PUBLIC: u16 = 0x0001;
    /// Visible to the declaring type only
    pub const PRIVATE: u16 = 0x0002;
    /// Visible to subtypes
    pub const PROTECTED: u16 = 0x0004;
    /// Belongs to the type rather than an instance
    pub const STATIC: u16 = 0x0008;
    /// Cannot be overridden or reassigned
    pub const FINAL: u16 = 0x0010;
    /// Type is an interface
    pub const INTERFACE: u16 = 0x0200;
    /// Method has no body
    pub const ABSTRACT: u16 = 0x0400;
    /// Generated, not present in source
    pub const SYNTHETIC: u16 = 0x1000;
}

/// Image encoding/decoding/assembly errors
#[derive(Debug, Error)]
pub enum ImageError {
    /// Decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected GRFT, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// CRC32 mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Computed checksum
        actual: u32,
    },

    /// SHA-256 mismatch
    #[error("Content digest mismatch")]
    DigestMismatch,

    /// Dangling constant pool reference
    #[error("Invalid {what} index {index}")]
    InvalidPoolIndex {
        /// What kind of entry was expected
        what: &'static str,
        /// The offending index
        index: u32,
    },

    /// Branch, handler or frame offset not on an instruction boundary
    #[error("Invalid code offset {offset} in method {method}")]
    InvalidCodeOffset {
        /// Method name and descriptor
        method: String,
        /// The offending offset
        offset: u32,
    },

    /// Label used but never placed in the instruction stream
    #[error("Label {label} is never bound in method {method}")]
    UnboundLabel {
        /// Method name and descriptor
        method: String,
        /// The unbound label
        label: Label,
    },

    /// Two frames declared at the same code offset
    #[error("Two frames at offset {offset} in method {method}")]
    DuplicateFrame {
        /// Method name and descriptor
        method: String,
        /// Offset of both frames
        offset: u32,
    },

    /// Malformed descriptor
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// Writer finished without a header
    #[error("Type has no header")]
    MissingHeader,
}

/// Verification type with names as pool indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VTypeDef {
    /// Unusable slot
    Top,
    /// Int category
    Int,
    /// Null reference
    Null,
    /// Uninitialized `this`
    UninitializedThis,
    /// Instance of the type at the string index
    Object(u32),
}

/// Frame kinds as stored in the frame table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Same locals, empty stack
    Same,
    /// Same locals, one stack item
    Same1(VTypeDef),
    /// Explicit locals and stack
    Full {
        /// Local types
        locals: Vec<VTypeDef>,
        /// Stack types
        stack: Vec<VTypeDef>,
    },
}

/// Frame table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDef {
    /// Code offset the frame applies to
    pub offset: u32,
    /// The declared frame
    pub kind: FrameKind,
}

/// Exception table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerDef {
    /// Start offset (inclusive)
    pub start: u32,
    /// End offset (exclusive)
    pub end: u32,
    /// Handler entry offset
    pub handler: u32,
    /// Caught type string index, [`NO_INDEX`] for any
    pub catch_type: u32,
}

/// Field definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Access flags
    pub access: u16,
    /// Name string index
    pub name: u32,
    /// Descriptor string index
    pub descriptor: u32,
}

/// Method definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodDef {
    /// Access flags
    pub access: u16,
    /// Name string index
    pub name: u32,
    /// Descriptor string index
    pub descriptor: u32,
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Encoded instructions
    pub code: Vec<u8>,
    /// Exception table
    pub handlers: Vec<HandlerDef>,
    /// Frame table, sorted by offset
    pub frames: Vec<FrameDef>,
}

/// A compiled type
#[derive(Debug, Clone)]
pub struct TypeImage {
    /// Access flags
    pub access: u16,
    /// Type name string index
    pub name: u32,
    /// Super type string index, [`NO_INDEX`] for root types
    pub super_name: u32,
    /// Constant pool
    pub constants: ConstantPool,
    /// Field definitions
    pub fields: Vec<FieldDef>,
    /// Method definitions
    pub methods: Vec<MethodDef>,
    /// SHA-256 of the payload, filled in by [`TypeImage::decode`]
    pub checksum: [u8; 32],
}

impl TypeImage {
    /// Internal name of the type
    pub fn name(&self) -> Result<&str, ImageError> {
        self.string(self.name, "type name")
    }

    /// Internal name of the super type, if any
    pub fn super_name(&self) -> Result<Option<&str>, ImageError> {
        if self.super_name == NO_INDEX {
            return Ok(None);
        }
        self.string(self.super_name, "super name").map(Some)
    }

    pub(crate) fn string(&self, index: u32, what: &'static str) -> Result<&str, ImageError> {
        self.constants
            .get_string(index)
            .ok_or(ImageError::InvalidPoolIndex { what, index })
    }

    /// Encode the image
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + crc32 (u32) + sha256 (32 bytes)
    /// - Constant pool
    /// - access (u16), name (u32), super name (u32)
    /// - Field table
    /// - Method table
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.emit_bytes(&MAGIC);
        writer.emit_u32(VERSION);
        let crc32_offset = writer.offset();
        writer.emit_u32(0);
        let sha256_offset = writer.offset();
        writer.emit_bytes(&[0u8; 32]);

        self.constants.encode(&mut writer);
        writer.emit_u16(self.access);
        writer.emit_u32(self.name);
        writer.emit_u32(self.super_name);

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            writer.emit_u16(field.access);
            writer.emit_u32(field.name);
            writer.emit_u32(field.descriptor);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(&mut writer);
        }

        let payload = &writer.buffer[HEADER_SIZE..];
        let crc32 = crc32fast::hash(payload);
        let digest: [u8; 32] = Sha256::digest(payload).into();

        writer.patch_u32(crc32_offset, crc32);
        writer.buffer[sha256_offset..sha256_offset + 32].copy_from_slice(&digest);

        writer.into_bytes()
    }

    /// Decode an image, checking magic, version and checksums
    pub fn decode(data: &[u8]) -> Result<Self, ImageError> {
        let mut reader = BytecodeReader::new(data);

        let magic: [u8; 4] = reader.read_array()?;
        if magic != MAGIC {
            return Err(ImageError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }

        let stored_crc32 = reader.read_u32()?;
        let checksum: [u8; 32] = reader.read_array()?;

        let payload = &data[HEADER_SIZE..];
        let calculated_crc32 = crc32fast::hash(payload);
        if stored_crc32 != calculated_crc32 {
            return Err(ImageError::ChecksumMismatch {
                expected: stored_crc32,
                actual: calculated_crc32,
            });
        }
        if Sha256::digest(payload).as_slice() != checksum {
            return Err(ImageError::DigestMismatch);
        }

        let constants = ConstantPool::decode(&mut reader)?;
        let access = reader.read_u16()?;
        let name = reader.read_u32()?;
        let super_name = reader.read_u32()?;

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(reader.remaining()));
        for _ in 0..field_count {
            fields.push(FieldDef {
                access: reader.read_u16()?,
                name: reader.read_u32()?,
                descriptor: reader.read_u32()?,
            });
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(reader.remaining()));
        for _ in 0..method_count {
            methods.push(MethodDef::decode(&mut reader)?);
        }

        let image = Self {
            access,
            name,
            super_name,
            constants,
            fields,
            methods,
            checksum,
        };
        image.name()?;
        image.super_name()?;
        Ok(image)
    }
}

impl MethodDef {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.access);
        writer.emit_u32(self.name);
        writer.emit_u32(self.descriptor);
        writer.emit_u16(self.max_stack);
        writer.emit_u16(self.max_locals);

        writer.emit_u32(self.code.len() as u32);
        writer.emit_bytes(&self.code);

        writer.emit_u32(self.handlers.len() as u32);
        for handler in &self.handlers {
            writer.emit_u32(handler.start);
            writer.emit_u32(handler.end);
            writer.emit_u32(handler.handler);
            writer.emit_u32(handler.catch_type);
        }

        writer.emit_u32(self.frames.len() as u32);
        for frame in &self.frames {
            writer.emit_u32(frame.offset);
            match &frame.kind {
                FrameKind::Same => writer.emit_u8(0),
                FrameKind::Same1(ty) => {
                    writer.emit_u8(1);
                    encode_vtype(writer, ty);
                }
                FrameKind::Full { locals, stack } => {
                    writer.emit_u8(2);
                    writer.emit_u16(locals.len() as u16);
                    for ty in locals {
                        encode_vtype(writer, ty);
                    }
                    writer.emit_u16(stack.len() as u16);
                    for ty in stack {
                        encode_vtype(writer, ty);
                    }
                }
            }
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let access = reader.read_u16()?;
        let name = reader.read_u32()?;
        let descriptor = reader.read_u32()?;
        let max_stack = reader.read_u16()?;
        let max_locals = reader.read_u16()?;

        let code_len = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_len)?;

        let handler_count = reader.read_u32()? as usize;
        let mut handlers = Vec::with_capacity(handler_count.min(reader.remaining()));
        for _ in 0..handler_count {
            handlers.push(HandlerDef {
                start: reader.read_u32()?,
                end: reader.read_u32()?,
                handler: reader.read_u32()?,
                catch_type: reader.read_u32()?,
            });
        }

        let frame_count = reader.read_u32()? as usize;
        let mut frames = Vec::with_capacity(frame_count.min(reader.remaining()));
        for _ in 0..frame_count {
            let offset = reader.read_u32()?;
            let tag_offset = reader.position();
            let kind = match reader.read_u8()? {
                0 => FrameKind::Same,
                1 => FrameKind::Same1(decode_vtype(reader)?),
                2 => {
                    let local_count = reader.read_u16()? as usize;
                    let mut locals = Vec::with_capacity(local_count);
                    for _ in 0..local_count {
                        locals.push(decode_vtype(reader)?);
                    }
                    let stack_count = reader.read_u16()? as usize;
                    let mut stack = Vec::with_capacity(stack_count);
                    for _ in 0..stack_count {
                        stack.push(decode_vtype(reader)?);
                    }
                    FrameKind::Full { locals, stack }
                }
                tag => {
                    return Err(DecodeError::InvalidTag {
                        what: "frame",
                        tag,
                        offset: tag_offset,
                    })
                }
            };
            frames.push(FrameDef { offset, kind });
        }

        Ok(Self {
            access,
            name,
            descriptor,
            max_stack,
            max_locals,
            code,
            handlers,
            frames,
        })
    }
}

fn encode_vtype(writer: &mut BytecodeWriter, ty: &VTypeDef) {
    match ty {
        VTypeDef::Top => writer.emit_u8(0),
        VTypeDef::Int => writer.emit_u8(1),
        VTypeDef::Null => writer.emit_u8(2),
        VTypeDef::UninitializedThis => writer.emit_u8(3),
        VTypeDef::Object(index) => {
            writer.emit_u8(4);
            writer.emit_u32(*index);
        }
    }
}

fn decode_vtype(reader: &mut BytecodeReader<'_>) -> Result<VTypeDef, DecodeError> {
    let offset = reader.position();
    let ty = match reader.read_u8()? {
        0 => VTypeDef::Top,
        1 => VTypeDef::Int,
        2 => VTypeDef::Null,
        3 => VTypeDef::UninitializedThis,
        4 => VTypeDef::Object(reader.read_u32()?),
        tag => {
            return Err(DecodeError::InvalidTag {
                what: "verification type",
                tag,
                offset,
            })
        }
    };
    Ok(ty)
}
