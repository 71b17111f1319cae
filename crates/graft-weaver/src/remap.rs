//! Symbol remapping
//!
//! Rewrites internal type names wherever an instruction stream can mention
//! them: member owners, type operands, object types inside descriptors,
//! frame entries and catch types. Names not in the table pass through.
//! String literals are data and are never touched.

use graft_bytecode::{Frame, Insn, Label, MemberRef, MethodVisitor, TryCatchBlock, VType};
use rustc_hash::FxHashMap;

/// Substitution table from old internal names to new ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolRemapper {
    table: FxHashMap<String, String>,
}

impl SymbolRemapper {
    /// Create an empty (identity) remapper
    pub fn new() -> Self {
        Self::default()
    }

    /// Remapper with exactly one entry
    pub fn single(from: impl Into<String>, to: impl Into<String>) -> Self {
        let mut remapper = Self::new();
        remapper.insert(from, to);
        remapper
    }

    /// Add or replace a mapping
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.table.insert(from.into(), to.into());
    }

    /// Map an internal type name
    pub fn map_type(&self, name: &str) -> String {
        self.table
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Map every object type inside a field or method descriptor
    pub fn map_descriptor(&self, descriptor: &str) -> String {
        let mut out = String::with_capacity(descriptor.len());
        let mut rest = descriptor;
        while let Some(start) = rest.find('L') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find(';') {
                Some(end) => {
                    out.push('L');
                    out.push_str(&self.map_type(&after[..end]));
                    out.push(';');
                    rest = &after[end + 1..];
                }
                // Malformed; leave the remainder alone
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Map a field or method reference (the member name is kept)
    pub fn map_member(&self, member: &MemberRef) -> MemberRef {
        MemberRef {
            owner: self.map_type(&member.owner),
            name: member.name.clone(),
            descriptor: self.map_descriptor(&member.descriptor),
        }
    }

    /// Map a verification type
    pub fn map_vtype(&self, ty: &VType) -> VType {
        match ty {
            VType::Object(name) => VType::Object(self.map_type(name)),
            other => other.clone(),
        }
    }

    /// Map every type in a frame
    pub fn map_frame(&self, frame: &Frame) -> Frame {
        match frame {
            Frame::Same => Frame::Same,
            Frame::Same1(ty) => Frame::Same1(self.map_vtype(ty)),
            Frame::Full { locals, stack } => Frame::Full {
                locals: locals.iter().map(|ty| self.map_vtype(ty)).collect(),
                stack: stack.iter().map(|ty| self.map_vtype(ty)).collect(),
            },
        }
    }

    /// Map an instruction
    pub fn map_insn(&self, insn: Insn) -> Insn {
        match insn {
            Insn::Getfield(m) => Insn::Getfield(self.map_member(&m)),
            Insn::Putfield(m) => Insn::Putfield(self.map_member(&m)),
            Insn::Getstatic(m) => Insn::Getstatic(self.map_member(&m)),
            Insn::Putstatic(m) => Insn::Putstatic(self.map_member(&m)),
            Insn::Invokevirtual(m) => Insn::Invokevirtual(self.map_member(&m)),
            Insn::Invokespecial(m) => Insn::Invokespecial(self.map_member(&m)),
            Insn::Invokestatic(m) => Insn::Invokestatic(self.map_member(&m)),
            Insn::New(ty) => Insn::New(self.map_type(&ty)),
            Insn::Checkcast(ty) => Insn::Checkcast(self.map_type(&ty)),
            Insn::Instanceof(ty) => Insn::Instanceof(self.map_type(&ty)),
            Insn::Frame(frame) => Insn::Frame(self.map_frame(&frame)),
            other => other,
        }
    }

    /// Map the catch type of a handler
    pub fn map_try_catch(&self, block: TryCatchBlock) -> TryCatchBlock {
        TryCatchBlock {
            catch_type: block.catch_type.map(|ty| self.map_type(&ty)),
            ..block
        }
    }
}

/// Method visitor that remaps everything passing through it
pub struct RemappingMethodVisitor<'r, M> {
    next: M,
    remapper: &'r SymbolRemapper,
}

impl<'r, M: MethodVisitor> RemappingMethodVisitor<'r, M> {
    /// Wrap `next`
    pub fn new(next: M, remapper: &'r SymbolRemapper) -> Self {
        Self { next, remapper }
    }
}

impl<M: MethodVisitor> MethodVisitor for RemappingMethodVisitor<'_, M> {
    fn new_label(&mut self) -> Label {
        self.next.new_label()
    }

    fn visit_code(&mut self) {
        self.next.visit_code();
    }

    fn visit_try_catch(&mut self, block: TryCatchBlock) {
        self.next.visit_try_catch(self.remapper.map_try_catch(block));
    }

    fn visit_insn(&mut self, insn: Insn) {
        self.next.visit_insn(self.remapper.map_insn(insn));
    }

    fn visit_end(&mut self) {
        self.next.visit_end();
    }
}
