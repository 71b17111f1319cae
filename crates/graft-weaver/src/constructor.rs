//! Constructor rewriting
//!
//! Makes every construction of the target run the mixin initializer exactly
//! once. A constructor that delegates to a sibling constructor of the same
//! type leaves the call to that sibling; every other constructor calls the
//! initializer right before each normal return.
//!
//! Delegation is a property of the whole constructor, so the body is held
//! back until its end and the calls are inserted on the way out. Building
//! another instance of the target (`NEW` followed by its `<init>`) is not
//! delegation.
//!
//! The initializer call is not guarded: an exception it throws leaves the
//! constructor like any other constructor failure.

use graft_bytecode::descriptor::VOID_DESCRIPTOR;
use graft_bytecode::{Insn, Label, MemberRef, MethodVisitor, TryCatchBlock};
use tracing::trace;

enum Event {
    TryCatch(TryCatchBlock),
    Insn(Insn),
}

/// Method visitor inserting initializer calls into one constructor
pub struct ConstructorRewriter<M> {
    next: M,
    target: String,
    initializer: MemberRef,
    body: Vec<Event>,
    pending_new: usize,
    cascading: bool,
    inserted: usize,
}

impl<M: MethodVisitor> ConstructorRewriter<M> {
    /// Rewrite a constructor of `target` to call `target.initializer()V`
    pub fn new(next: M, target: impl Into<String>, initializer: &str) -> Self {
        let target = target.into();
        Self {
            next,
            initializer: MemberRef::new(target.clone(), initializer, VOID_DESCRIPTOR),
            target,
            body: Vec::new(),
            pending_new: 0,
            cascading: false,
            inserted: 0,
        }
    }

    /// Whether a sibling constructor call has been seen
    pub fn is_cascading(&self) -> bool {
        self.cascading
    }

    /// Number of initializer calls inserted
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    fn flush(&mut self) {
        for event in std::mem::take(&mut self.body) {
            match event {
                Event::TryCatch(block) => self.next.visit_try_catch(block),
                Event::Insn(insn) => {
                    if insn == Insn::Return && !self.cascading {
                        self.next.visit_insn(Insn::Aload(0));
                        self.next
                            .visit_insn(Insn::Invokevirtual(self.initializer.clone()));
                        self.inserted += 1;
                    }
                    self.next.visit_insn(insn);
                }
            }
        }
    }
}

impl<M: MethodVisitor> MethodVisitor for ConstructorRewriter<M> {
    fn new_label(&mut self) -> Label {
        self.next.new_label()
    }

    fn visit_code(&mut self) {
        self.next.visit_code();
    }

    fn visit_try_catch(&mut self, block: TryCatchBlock) {
        self.body.push(Event::TryCatch(block));
    }

    fn visit_insn(&mut self, insn: Insn) {
        match &insn {
            Insn::New(ty) if *ty == self.target => self.pending_new += 1,
            Insn::Invokespecial(member) if member.is_constructor() && member.owner == self.target => {
                // an unmatched call can only be on `this`
                if self.pending_new > 0 {
                    self.pending_new -= 1;
                } else {
                    self.cascading = true;
                }
            }
            _ => {}
        }
        self.body.push(Event::Insn(insn));
    }

    fn visit_end(&mut self) {
        self.flush();
        trace!(
            target_type = %self.target,
            cascading = self.cascading,
            inserted = self.inserted,
            "rewrote constructor"
        );
        self.next.visit_end();
    }
}
