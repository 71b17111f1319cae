//! Terminal visitor that assembles a type image
//!
//! The writer owns label allocation for every method it receives. Labels are
//! laid out to code offsets when a method ends, member and type operands are
//! interned into the constant pool, and `max_stack`/`max_locals` are computed
//! from the instructions themselves.
//!
//! Assembly problems are recorded and reported from `visit_end`, the only
//! fallible event.

use crate::constants::ConstantPool;
use crate::descriptor::MethodDescriptor;
use crate::encoder::BytecodeWriter;
use crate::image::{
    FieldDef, FrameDef, FrameKind, HandlerDef, ImageError, MethodDef, TypeImage, VTypeDef,
    NO_INDEX,
};
use crate::insn::{Frame, Insn, Label, TryCatchBlock, VType};
use crate::visitor::{FieldInfo, MethodInfo, MethodVisitor, TypeHeader, TypeVisitor};
use rustc_hash::FxHashMap;

/// Assembles visited events into a [`TypeImage`]
#[derive(Debug, Default)]
pub struct TypeWriter {
    header: Option<(u16, u32, u32)>,
    constants: ConstantPool,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    error: Option<ImageError>,
}

impl TypeWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish and return the assembled image
    pub fn into_image(self) -> Result<TypeImage, ImageError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let (access, name, super_name) = self.header.ok_or(ImageError::MissingHeader)?;
        Ok(TypeImage {
            access,
            name,
            super_name,
            constants: self.constants,
            fields: self.fields,
            methods: self.methods,
            checksum: [0; 32],
        })
    }

    /// Finish and encode the assembled image
    pub fn to_bytes(self) -> Result<Vec<u8>, ImageError> {
        Ok(self.into_image()?.encode())
    }

    fn record(&mut self, err: ImageError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

impl TypeVisitor for TypeWriter {
    type Error = ImageError;

    fn visit_header(&mut self, header: &TypeHeader) {
        let name = self.constants.add_string(&header.name);
        let super_name = match &header.super_name {
            Some(super_name) => self.constants.add_string(super_name),
            None => NO_INDEX,
        };
        self.header = Some((header.access, name, super_name));
    }

    fn visit_field(&mut self, field: &FieldInfo) {
        let name = self.constants.add_string(&field.name);
        let descriptor = self.constants.add_string(&field.descriptor);
        self.fields.push(FieldDef {
            access: field.access,
            name,
            descriptor,
        });
    }

    fn visit_method<'a>(&'a mut self, method: &MethodInfo) -> Box<dyn MethodVisitor + 'a> {
        Box::new(MethodWriter {
            owner: self,
            info: method.clone(),
            insns: Vec::new(),
            try_catch_blocks: Vec::new(),
            next_label: 0,
        })
    }

    fn visit_end(&mut self) -> Result<(), ImageError> {
        match self.error.take() {
            Some(err) => Err(err),
            None if self.header.is_none() => Err(ImageError::MissingHeader),
            None => Ok(()),
        }
    }
}

struct MethodWriter<'a> {
    owner: &'a mut TypeWriter,
    info: MethodInfo,
    insns: Vec<Insn>,
    try_catch_blocks: Vec<TryCatchBlock>,
    next_label: u32,
}

impl MethodVisitor for MethodWriter<'_> {
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

    fn visit_end(&mut self) {
        match self.assemble() {
            Ok(def) => self.owner.methods.push(def),
            Err(err) => self.owner.record(err),
        }
    }
}

/// Where a label landed: byte offset and index of the next real instruction
#[derive(Clone, Copy)]
struct Bound {
    offset: u32,
    index: usize,
}

impl MethodWriter<'_> {
    fn assemble(&mut self) -> Result<MethodDef, ImageError> {
        let method_id = format!("{}{}", self.info.name, self.info.descriptor);
        let pool = &mut self.owner.constants;

        // Layout: bind labels and frames to offsets
        let mut bound: FxHashMap<Label, Bound> = FxHashMap::default();
        let mut frames: Vec<(u32, &Frame)> = Vec::new();
        let mut real: Vec<&Insn> = Vec::with_capacity(self.insns.len());
        let mut offset = 0u32;
        for insn in &self.insns {
            match insn {
                Insn::Label(label) => {
                    bound.entry(*label).or_insert(Bound {
                        offset,
                        index: real.len(),
                    });
                }
                Insn::Frame(frame) => {
                    if frames.last().is_some_and(|(at, _)| *at == offset) {
                        return Err(ImageError::DuplicateFrame {
                            method: method_id,
                            offset,
                        });
                    }
                    frames.push((offset, frame));
                }
                other => {
                    real.push(other);
                    offset += other.encoded_size() as u32;
                }
            }
        }

        let resolve = |label: Label| {
            bound.get(&label).copied().ok_or_else(|| ImageError::UnboundLabel {
                method: method_id.clone(),
                label,
            })
        };

        // Encode
        let mut code = BytecodeWriter::with_capacity(offset as usize);
        for insn in &real {
            let Some(opcode) = insn.opcode() else {
                continue;
            };
            code.emit_u8(opcode.to_u8());
            match insn {
                Insn::Iconst(value) => code.emit_i32(*value),
                Insn::Ldc(s) => code.emit_u32(pool.add_string(s)),
                Insn::Iload(slot) | Insn::Istore(slot) | Insn::Aload(slot) | Insn::Astore(slot) => {
                    code.emit_u16(*slot)
                }
                Insn::New(ty) | Insn::Checkcast(ty) | Insn::Instanceof(ty) => {
                    code.emit_u32(pool.add_string(ty))
                }
                other => {
                    if let Some(target) = other.jump_target() {
                        code.emit_u32(resolve(target)?.offset);
                    } else if let Some(member) = other.member() {
                        code.emit_u32(pool.add_member(
                            &member.owner,
                            &member.name,
                            &member.descriptor,
                        ));
                    }
                }
            }
        }

        let mut handlers = Vec::with_capacity(self.try_catch_blocks.len());
        let mut handler_entries = Vec::with_capacity(self.try_catch_blocks.len());
        for block in &self.try_catch_blocks {
            let handler = resolve(block.handler)?;
            handler_entries.push(handler.index);
            handlers.push(HandlerDef {
                start: resolve(block.start)?.offset,
                end: resolve(block.end)?.offset,
                handler: handler.offset,
                catch_type: block
                    .catch_type
                    .as_deref()
                    .map_or(NO_INDEX, |ty| pool.add_string(ty)),
            });
        }

        let frames = frames
            .into_iter()
            .map(|(offset, frame)| FrameDef {
                offset,
                kind: frame_kind(pool, frame),
            })
            .collect();

        // Stack depth flow
        let mut depth_at: Vec<Option<usize>> = vec![None; real.len()];
        let mut pending: Vec<(usize, usize)> = vec![(0, 0)];
        pending.extend(handler_entries.iter().map(|&index| (index, 1)));
        let mut max_stack = 0usize;
        while let Some((index, depth)) = pending.pop() {
            let Some(slot) = depth_at.get_mut(index) else {
                continue;
            };
            if slot.is_some() {
                continue;
            }
            *slot = Some(depth);
            let insn = real[index];
            let (pops, pushes) = insn.stack_effect()?;
            let after = depth.saturating_sub(pops) + pushes;
            max_stack = max_stack.max(depth).max(after);
            if let Some(target) = insn.jump_target() {
                pending.push((resolve(target)?.index, after));
            }
            if !insn.opcode().is_some_and(|op| op.is_terminator()) {
                pending.push((index + 1, after));
            }
        }

        // Locals: arguments plus every slot touched or declared
        let descriptor = MethodDescriptor::parse(&self.info.descriptor)?;
        let mut max_locals = descriptor.arg_count() + usize::from(!self.info.is_static());
        for insn in &real {
            if let Insn::Iload(slot) | Insn::Istore(slot) | Insn::Aload(slot) | Insn::Astore(slot) =
                insn
            {
                max_locals = max_locals.max(*slot as usize + 1);
            }
        }
        for insn in &self.insns {
            if let Insn::Frame(Frame::Full { locals, .. }) = insn {
                max_locals = max_locals.max(locals.len());
            }
        }

        Ok(MethodDef {
            access: self.info.access,
            name: pool.add_string(&self.info.name),
            descriptor: pool.add_string(&self.info.descriptor),
            max_stack: max_stack.min(u16::MAX as usize) as u16,
            max_locals: max_locals.min(u16::MAX as usize) as u16,
            code: code.into_bytes(),
            handlers,
            frames,
        })
    }
}

fn vtype_def(pool: &mut ConstantPool, ty: &VType) -> VTypeDef {
    match ty {
        VType::Top => VTypeDef::Top,
        VType::Int => VTypeDef::Int,
        VType::Null => VTypeDef::Null,
        VType::UninitializedThis => VTypeDef::UninitializedThis,
        VType::Object(name) => VTypeDef::Object(pool.add_string(name)),
    }
}

fn frame_kind(pool: &mut ConstantPool, frame: &Frame) -> FrameKind {
    match frame {
        Frame::Same => FrameKind::Same,
        Frame::Same1(ty) => FrameKind::Same1(vtype_def(pool, ty)),
        Frame::Full { locals, stack } => FrameKind::Full {
            locals: locals.iter().map(|ty| vtype_def(pool, ty)).collect(),
            stack: stack.iter().map(|ty| vtype_def(pool, ty)).collect(),
        },
    }
}
