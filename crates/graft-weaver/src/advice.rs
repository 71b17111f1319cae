//! Advice wrapping
//!
//! Advice is a static `()V` method called on entry to selected methods. Each
//! call runs inside its own safety-net region, so a failing advice is
//! reported and the method body still runs.

use crate::safety_net::{SafetyNet, SafetyNetRegion};
use graft_bytecode::descriptor::VOID_DESCRIPTOR;
use graft_bytecode::{
    FieldInfo, Insn, Label, MemberRef, MethodInfo, MethodVisitor, TryCatchBlock, TypeHeader,
    TypeVisitor,
};
use tracing::debug;

/// Which methods to instrument and with what
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdviceBinding {
    /// Method name to match
    pub method: String,
    /// Descriptor to match, any overload when `None`
    pub descriptor: Option<String>,
    /// Static `()V` method to call on entry
    pub advice: MemberRef,
}

impl AdviceBinding {
    /// Apply `advice` to every method called `method`
    pub fn new(method: impl Into<String>, advice: MemberRef) -> Self {
        Self {
            method: method.into(),
            descriptor: None,
            advice,
        }
    }

    /// Restrict to one overload
    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = Some(descriptor.into());
        self
    }

    /// Check the advice reference has the required shape
    pub fn is_valid(&self) -> bool {
        self.advice.descriptor == VOID_DESCRIPTOR && !self.advice.is_constructor()
    }

    /// Whether `method` should be instrumented
    ///
    /// Constructors and methods without code never match.
    pub fn matches(&self, method: &MethodInfo) -> bool {
        !method.is_constructor()
            && !method.is_abstract()
            && method.name == self.method
            && self
                .descriptor
                .as_deref()
                .map_or(true, |d| d == method.descriptor)
    }
}

/// Type visitor applying advice bindings
pub struct AdviceTypeVisitor<'n, V> {
    next: V,
    bindings: Vec<AdviceBinding>,
    safety_net: &'n SafetyNet,
    owner: String,
}

impl<'n, V: TypeVisitor> AdviceTypeVisitor<'n, V> {
    /// Wrap `next`
    pub fn new(next: V, bindings: Vec<AdviceBinding>, safety_net: &'n SafetyNet) -> Self {
        Self {
            next,
            bindings,
            safety_net,
            owner: String::new(),
        }
    }

    /// Unwrap the next stage
    pub fn into_inner(self) -> V {
        self.next
    }
}

impl<V: TypeVisitor> TypeVisitor for AdviceTypeVisitor<'_, V> {
    type Error = V::Error;

    fn visit_header(&mut self, header: &TypeHeader) {
        self.owner = header.name.clone();
        self.next.visit_header(header);
    }

    fn visit_field(&mut self, field: &FieldInfo) {
        self.next.visit_field(field);
    }

    fn visit_method<'a>(&'a mut self, method: &MethodInfo) -> Box<dyn MethodVisitor + 'a> {
        let advice: Vec<MemberRef> = self
            .bindings
            .iter()
            .filter(|binding| binding.matches(method))
            .map(|binding| binding.advice.clone())
            .collect();
        let next = self.next.visit_method(method);
        if advice.is_empty() {
            return next;
        }
        debug!(
            owner = %self.owner,
            method = %method.name,
            descriptor = %method.descriptor,
            advice = advice.len(),
            "applying advice"
        );
        Box::new(AdviceMethodVisitor::new(next, advice, self.safety_net))
    }

    fn visit_end(&mut self) -> Result<(), V::Error> {
        self.next.visit_end()
    }
}

/// Method visitor calling advice, each under a safety net, before the body
pub struct AdviceMethodVisitor<'n, M> {
    next: M,
    advice: Vec<MemberRef>,
    safety_net: &'n SafetyNet,
    at_entry: bool,
    leading: Vec<Insn>,
}

impl<'n, M: MethodVisitor> AdviceMethodVisitor<'n, M> {
    /// Call every member of `advice`, in order, on entry
    pub fn new(next: M, advice: Vec<MemberRef>, safety_net: &'n SafetyNet) -> Self {
        Self {
            next,
            advice,
            safety_net,
            at_entry: false,
            leading: Vec::new(),
        }
    }
}

impl<M: MethodVisitor> MethodVisitor for AdviceMethodVisitor<'_, M> {
    fn new_label(&mut self) -> Label {
        self.next.new_label()
    }

    fn visit_code(&mut self) {
        self.next.visit_code();
        for advice in &self.advice {
            let region = SafetyNetRegion::new(&mut self.next);
            region.open(&mut self.next);
            self.next.visit_insn(Insn::Invokestatic(advice.clone()));
            region.close(&mut self.next, self.safety_net);
        }
        self.at_entry = true;
    }

    fn visit_try_catch(&mut self, block: TryCatchBlock) {
        self.next.visit_try_catch(block);
    }

    fn visit_insn(&mut self, insn: Insn) {
        if self.at_entry {
            match insn {
                Insn::Label(_) => {
                    self.leading.push(insn);
                    return;
                }
                // The prologue already declared a frame at this offset; the
                // body's labels move past the NOP with their frame
                Insn::Frame(_) => self.next.visit_insn(Insn::Nop),
                _ => {}
            }
            self.at_entry = false;
            for label in std::mem::take(&mut self.leading) {
                self.next.visit_insn(label);
            }
        }
        self.next.visit_insn(insn);
    }

    fn visit_end(&mut self) {
        for label in std::mem::take(&mut self.leading) {
            self.next.visit_insn(label);
        }
        self.next.visit_end();
    }
}
