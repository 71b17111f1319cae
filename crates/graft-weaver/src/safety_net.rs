//! Safety net generation
//!
//! A safety net is the handler placed behind instrumentation code: whatever
//! the instrumentation throws is handed to a reporting hook together with a
//! fixed message, and execution resumes after the protected region as if
//! nothing had happened.

use graft_bytecode::descriptor::{STRING, THROWABLE};
use graft_bytecode::{Frame, Insn, Label, MemberRef, MethodVisitor, TryCatchBlock, VType};
use once_cell::sync::Lazy;

/// Message passed to the reporting hook
pub const DEFAULT_MESSAGE: &str = "An error occurred while trying to apply an advisor";

/// Type declaring the reporting hook
pub const DEFAULT_REPORT_OWNER: &str = "graft/rt/Report";

/// Name of the reporting hook
pub const DEFAULT_REPORT_NAME: &str = "error";

static DEFAULT: Lazy<SafetyNet> =
    Lazy::new(|| SafetyNet::new(DEFAULT_MESSAGE, DEFAULT_REPORT_OWNER, DEFAULT_REPORT_NAME));

/// Descriptor every reporting hook must have: `(message, cause)`
pub fn report_descriptor() -> String {
    format!("(L{};L{};)V", STRING, THROWABLE)
}

/// Operand stack effect of an emitted sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSize {
    /// Net change in depth
    pub net: i32,
    /// Maximum growth above the starting depth
    pub max: u32,
}

/// Immutable handler template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyNet {
    message: String,
    hook: MemberRef,
}

impl SafetyNet {
    /// Build a safety net reporting through `owner.name(Lstd/String;Lstd/Throwable;)V`
    pub fn new(message: impl Into<String>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hook: MemberRef::new(owner, name, report_descriptor()),
        }
    }

    /// The process-wide default safety net
    pub fn instance() -> &'static SafetyNet {
        &DEFAULT
    }

    /// Diagnostic message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Reporting hook
    pub fn hook(&self) -> &MemberRef {
        &self.hook
    }

    /// The handler body, entered with the throwable on the stack
    ///
    /// Ends with `resume` bound and an empty-stack frame declared there.
    pub fn sequence(&self, resume: Label) -> Vec<Insn> {
        vec![
            Insn::Ldc(self.message.clone()),
            Insn::Swap,
            Insn::Invokestatic(self.hook.clone()),
            Insn::Goto(resume),
            Insn::Label(resume),
            Insn::Frame(Frame::Same),
        ]
    }

    /// Emit the handler body into `mv`
    pub fn apply<M: MethodVisitor + ?Sized>(&self, mv: &mut M, resume: Label) -> StackSize {
        for insn in self.sequence(resume) {
            mv.visit_insn(insn);
        }
        // throwable in; LDC pushes the message on top of it; the hook consumes both
        StackSize { net: -1, max: 1 }
    }
}

impl Default for SafetyNet {
    fn default() -> Self {
        Self::instance().clone()
    }
}

/// Bracket around instrumentation code plus its catch-all handler
///
/// Created per instrumented method and emitted once: [`open`] before the
/// instrumentation, [`close`] after it.
///
/// [`open`]: SafetyNetRegion::open
/// [`close`]: SafetyNetRegion::close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyNetRegion {
    /// First protected instruction
    pub start: Label,
    /// First instruction after the protected range
    pub end: Label,
    /// Handler entry
    pub handler: Label,
    /// Where execution continues, normally or after a report
    pub resume: Label,
}

impl SafetyNetRegion {
    /// Allocate the region's labels from `mv`
    pub fn new<M: MethodVisitor + ?Sized>(mv: &mut M) -> Self {
        Self {
            start: mv.new_label(),
            end: mv.new_label(),
            handler: mv.new_label(),
            resume: mv.new_label(),
        }
    }

    /// Register the handler and mark the start of the protected range
    pub fn open<M: MethodVisitor + ?Sized>(&self, mv: &mut M) {
        mv.visit_try_catch(TryCatchBlock {
            start: self.start,
            end: self.end,
            handler: self.handler,
            catch_type: None,
        });
        mv.visit_insn(Insn::Label(self.start));
    }

    /// End the protected range and emit the handler
    pub fn close<M: MethodVisitor + ?Sized>(&self, mv: &mut M, net: &SafetyNet) -> StackSize {
        mv.visit_insn(Insn::Label(self.end));
        mv.visit_insn(Insn::Goto(self.resume));
        mv.visit_insn(Insn::Label(self.handler));
        mv.visit_insn(Insn::Frame(Frame::Same1(VType::Object(THROWABLE.to_string()))));
        net.apply(mv, self.resume)
    }
}
