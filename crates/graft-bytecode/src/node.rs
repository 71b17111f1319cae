//! Tree form of a type
//!
//! [`TypeNode`] is what the reader produces from a type image and what
//! stages use when they need random access to a whole type (the mixin donor,
//! tests). It can drive a [`TypeVisitor`] and can itself collect the events
//! of one.

use crate::encoder::{BytecodeReader, DecodeError};
use crate::image::{FrameKind, ImageError, MethodDef, TypeImage, VTypeDef, NO_INDEX};
use crate::insn::{Frame, Insn, Label, MemberRef, TryCatchBlock, VType};
use crate::opcode::Opcode;
use crate::visitor::{FieldInfo, MethodInfo, MethodVisitor, TypeHeader, TypeVisitor};
use crate::writer::TypeWriter;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::convert::Infallible;

/// A whole type held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeNode {
    /// Header
    pub header: TypeHeader,
    /// Fields in declaration order
    pub fields: Vec<FieldInfo>,
    /// Methods in declaration order
    pub methods: Vec<MethodNode>,
}

impl TypeNode {
    /// Create an empty type with the given header
    pub fn new(header: TypeHeader) -> Self {
        Self {
            header,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Decode a type image into its tree form
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        Self::from_image(&TypeImage::decode(bytes)?)
    }

    /// Resolve an already decoded image
    pub fn from_image(image: &TypeImage) -> Result<Self, ImageError> {
        let header = TypeHeader {
            access: image.access,
            name: image.name()?.to_string(),
            super_name: image.super_name()?.map(str::to_string),
        };

        let fields = image
            .fields
            .iter()
            .map(|field| {
                Ok(FieldInfo {
                    access: field.access,
                    name: image.string(field.name, "field name")?.to_string(),
                    descriptor: image.string(field.descriptor, "field descriptor")?.to_string(),
                })
            })
            .collect::<Result<Vec<_>, ImageError>>()?;

        let methods = image
            .methods
            .iter()
            .map(|method| MethodNode::from_def(image, method))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header,
            fields,
            methods,
        })
    }

    /// Assemble and encode this type
    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        let mut writer = TypeWriter::new();
        self.accept(&mut writer)?;
        writer.to_bytes()
    }

    /// Replay this type as events into a visitor
    pub fn accept<V: TypeVisitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        visitor.visit_header(&self.header);
        for field in &self.fields {
            visitor.visit_field(field);
        }
        for method in &self.methods {
            let mut mv = visitor.visit_method(&method.info);
            method.accept(&mut *mv);
        }
        visitor.visit_end()
    }

    /// Find a method by name and descriptor
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|m| m.info.name == name && m.info.descriptor == descriptor)
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl TypeVisitor for TypeNode {
    type Error = Infallible;

    fn visit_header(&mut self, header: &TypeHeader) {
        self.header = header.clone();
    }

    fn visit_field(&mut self, field: &FieldInfo) {
        self.fields.push(field.clone());
    }

    fn visit_method<'a>(&'a mut self, method: &MethodInfo) -> Box<dyn MethodVisitor + 'a> {
        let index = self.methods.len();
        self.methods.push(MethodNode::new(method.clone()));
        Box::new(&mut self.methods[index])
    }

    fn visit_end(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// One method held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodNode {
    /// Name, descriptor and access flags
    pub info: MethodInfo,
    /// Exception handlers, innermost first
    pub try_catch_blocks: Vec<TryCatchBlock>,
    /// Instructions, including label and frame pseudo-instructions
    pub insns: Vec<Insn>,
    next_label: u32,
}

impl MethodNode {
    /// Create a method with an empty body
    pub fn new(info: MethodInfo) -> Self {
        Self {
            info,
            try_catch_blocks: Vec::new(),
            insns: Vec::new(),
            next_label: 0,
        }
    }

    /// Real instructions only, skipping labels and frames
    pub fn code(&self) -> impl Iterator<Item = &Insn> + '_ {
        self.insns.iter().filter(|insn| !insn.is_pseudo())
    }

    /// Replay the body into a method visitor
    ///
    /// Labels are reallocated through the visitor so the receiver owns every
    /// label it sees.
    pub fn accept<M: MethodVisitor + ?Sized>(&self, mv: &mut M) {
        let mut labels: FxHashMap<Label, Label> = FxHashMap::default();
        let mentioned = self
            .try_catch_blocks
            .iter()
            .flat_map(|block| [block.start, block.end, block.handler])
            .chain(self.insns.iter().filter_map(|insn| match insn {
                Insn::Label(label) => Some(*label),
                other => other.jump_target(),
            }));
        for label in mentioned {
            labels.entry(label).or_insert_with(|| mv.new_label());
        }
        let relabel = |label: Label| labels.get(&label).copied().unwrap_or(label);

        mv.visit_code();
        for block in &self.try_catch_blocks {
            mv.visit_try_catch(TryCatchBlock {
                start: relabel(block.start),
                end: relabel(block.end),
                handler: relabel(block.handler),
                catch_type: block.catch_type.clone(),
            });
        }
        for insn in &self.insns {
            mv.visit_insn(insn.clone().map_labels(relabel));
        }
        mv.visit_end();
    }

    fn from_def(image: &TypeImage, def: &MethodDef) -> Result<Self, ImageError> {
        let info = MethodInfo {
            access: def.access,
            name: image.string(def.name, "method name")?.to_string(),
            descriptor: image.string(def.descriptor, "method descriptor")?.to_string(),
        };
        let method_id = format!("{}{}", info.name, info.descriptor);
        let code_len = def.code.len() as u32;

        // First pass: split the code into instructions, branch targets still raw
        let mut raw = Vec::new();
        let mut reader = BytecodeReader::new(&def.code);
        while reader.has_more() {
            let offset = reader.position() as u32;
            let byte = reader.read_u8()?;
            let opcode = Opcode::from_u8(byte)
                .ok_or(DecodeError::InvalidOpcode(byte, offset as usize))?;
            let operand = match opcode.operand_size() {
                0 => 0,
                2 => reader.read_u16()? as u32,
                _ => reader.read_u32()?,
            };
            raw.push((offset, opcode, operand));
        }

        let boundary = |offset: u32| raw.binary_search_by_key(&offset, |r| r.0).is_ok();
        let invalid = |offset: u32| ImageError::InvalidCodeOffset {
            method: method_id.clone(),
            offset,
        };

        // Every offset something jumps to gets a label, numbered by position
        let mut label_at: BTreeMap<u32, Label> = BTreeMap::new();
        for &(_, opcode, operand) in &raw {
            if opcode.is_jump() {
                if !boundary(operand) {
                    return Err(invalid(operand));
                }
                label_at.insert(operand, Label(0));
            }
        }
        for handler in &def.handlers {
            for offset in [handler.start, handler.handler] {
                if !boundary(offset) {
                    return Err(invalid(offset));
                }
                label_at.insert(offset, Label(0));
            }
            if handler.end != code_len && !boundary(handler.end) {
                return Err(invalid(handler.end));
            }
            label_at.insert(handler.end, Label(0));
        }
        for (id, label) in label_at.values_mut().enumerate() {
            *label = Label(id as u32);
        }

        let mut frame_at: BTreeMap<u32, Frame> = BTreeMap::new();
        for frame in &def.frames {
            if !boundary(frame.offset) {
                return Err(invalid(frame.offset));
            }
            let resolved = resolve_frame(image, &frame.kind)?;
            if frame_at.insert(frame.offset, resolved).is_some() {
                return Err(ImageError::DuplicateFrame {
                    method: method_id.clone(),
                    offset: frame.offset,
                });
            }
        }

        let label = |offset: u32| label_at.get(&offset).copied().ok_or_else(|| invalid(offset));
        let member = |index: u32| {
            image
                .constants
                .get_member(index)
                .map(|(owner, name, desc)| MemberRef::new(owner, name, desc))
                .ok_or(ImageError::InvalidPoolIndex {
                    what: "member",
                    index,
                })
        };
        let type_name = |index: u32| image.string(index, "type name").map(str::to_string);

        let mut insns = Vec::with_capacity(raw.len() + label_at.len() + frame_at.len());
        for &(offset, opcode, operand) in &raw {
            if let Some(&l) = label_at.get(&offset) {
                insns.push(Insn::Label(l));
            }
            if let Some(frame) = frame_at.get(&offset) {
                insns.push(Insn::Frame(frame.clone()));
            }
            let insn = match opcode {
                Opcode::Nop => Insn::Nop,
                Opcode::Pop => Insn::Pop,
                Opcode::Dup => Insn::Dup,
                Opcode::Swap => Insn::Swap,
                Opcode::AconstNull => Insn::AconstNull,
                Opcode::Iconst => Insn::Iconst(operand as i32),
                Opcode::Ldc => Insn::Ldc(image.string(operand, "string literal")?.to_string()),
                Opcode::Iload => Insn::Iload(operand as u16),
                Opcode::Istore => Insn::Istore(operand as u16),
                Opcode::Aload => Insn::Aload(operand as u16),
                Opcode::Astore => Insn::Astore(operand as u16),
                Opcode::Iadd => Insn::Iadd,
                Opcode::Isub => Insn::Isub,
                Opcode::Imul => Insn::Imul,
                Opcode::Idiv => Insn::Idiv,
                Opcode::Ineg => Insn::Ineg,
                Opcode::Goto => Insn::Goto(label(operand)?),
                Opcode::Ifeq => Insn::Ifeq(label(operand)?),
                Opcode::Ifne => Insn::Ifne(label(operand)?),
                Opcode::Ifnull => Insn::Ifnull(label(operand)?),
                Opcode::Ifnonnull => Insn::Ifnonnull(label(operand)?),
                Opcode::Return => Insn::Return,
                Opcode::Ireturn => Insn::Ireturn,
                Opcode::Areturn => Insn::Areturn,
                Opcode::Athrow => Insn::Athrow,
                Opcode::Getfield => Insn::Getfield(member(operand)?),
                Opcode::Putfield => Insn::Putfield(member(operand)?),
                Opcode::Getstatic => Insn::Getstatic(member(operand)?),
                Opcode::Putstatic => Insn::Putstatic(member(operand)?),
                Opcode::Invokevirtual => Insn::Invokevirtual(member(operand)?),
                Opcode::Invokespecial => Insn::Invokespecial(member(operand)?),
                Opcode::Invokestatic => Insn::Invokestatic(member(operand)?),
                Opcode::New => Insn::New(type_name(operand)?),
                Opcode::Checkcast => Insn::Checkcast(type_name(operand)?),
                Opcode::Instanceof => Insn::Instanceof(type_name(operand)?),
            };
            insns.push(insn);
        }
        if let Some(&l) = label_at.get(&code_len) {
            insns.push(Insn::Label(l));
        }

        let try_catch_blocks = def
            .handlers
            .iter()
            .map(|handler| {
                let catch_type = if handler.catch_type == NO_INDEX {
                    None
                } else {
                    Some(type_name(handler.catch_type)?)
                };
                Ok(TryCatchBlock {
                    start: label(handler.start)?,
                    end: label(handler.end)?,
                    handler: label(handler.handler)?,
                    catch_type,
                })
            })
            .collect::<Result<Vec<_>, ImageError>>()?;

        Ok(Self {
            info,
            try_catch_blocks,
            insns,
            next_label: label_at.len() as u32,
        })
    }
}

fn resolve_vtype(image: &TypeImage, ty: &VTypeDef) -> Result<VType, ImageError> {
    Ok(match ty {
        VTypeDef::Top => VType::Top,
        VTypeDef::Int => VType::Int,
        VTypeDef::Null => VType::Null,
        VTypeDef::UninitializedThis => VType::UninitializedThis,
        VTypeDef::Object(index) => VType::Object(image.string(*index, "frame type")?.to_string()),
    })
}

fn resolve_frame(image: &TypeImage, kind: &FrameKind) -> Result<Frame, ImageError> {
    Ok(match kind {
        FrameKind::Same => Frame::Same,
        FrameKind::Same1(ty) => Frame::Same1(resolve_vtype(image, ty)?),
        FrameKind::Full { locals, stack } => Frame::Full {
            locals: locals
                .iter()
                .map(|ty| resolve_vtype(image, ty))
                .collect::<Result<_, _>>()?,
            stack: stack
                .iter()
                .map(|ty| resolve_vtype(image, ty))
                .collect::<Result<_, _>>()?,
        },
    })
}

impl MethodVisitor for MethodNode {
    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn visit_try_catch(&mut self, block: TryCatchBlock) {
        self.try_catch_blocks.push(block);
    }

    fn visit_insn(&mut self, insn: Insn) {
        self.insns.push(insn);
    }
}
