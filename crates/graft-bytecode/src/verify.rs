//! Structural verification
//!
//! The acceptance check a runtime applies before loading a type. Every method
//! is walked once in code order; the declared frames make that sufficient,
//! since every jump target and handler entry must carry one and the state
//! arriving there is checked against it.

use crate::descriptor::{FieldType, MethodDescriptor, STRING};
use crate::insn::{Frame, Insn, Label, VType};
use crate::node::{MethodNode, TypeNode};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Verification errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// Stack underflow
    #[error("{method}: stack underflow at instruction {index}")]
    StackUnderflow {
        /// Method name and descriptor
        method: String,
        /// Instruction index
        index: usize,
    },

    /// Operand of the wrong category
    #[error("{method}: expected {expected} at instruction {index}, found {found}")]
    TypeMismatch {
        /// Method name and descriptor
        method: String,
        /// Instruction index
        index: usize,
        /// What the instruction needs
        expected: String,
        /// What was there
        found: VType,
    },

    /// Return instruction disagrees with the descriptor
    #[error("{method}: return at instruction {index} does not match the descriptor")]
    ReturnMismatch {
        /// Method name and descriptor
        method: String,
        /// Instruction index
        index: usize,
    },

    /// Local out of range or holding the wrong kind of value
    #[error("{method}: local {slot} is out of range or unusable at instruction {index}")]
    InvalidLocal {
        /// Method name and descriptor
        method: String,
        /// Instruction index
        index: usize,
        /// Local slot
        slot: u16,
    },

    /// Branch target, handler entry or code after a terminator without a frame
    #[error("{method}: no frame at instruction {index}")]
    MissingFrame {
        /// Method name and descriptor
        method: String,
        /// Instruction index that needs a frame
        index: usize,
    },

    /// Incoming state not assignable to the declared frame
    #[error("{method}: state does not match the frame at instruction {index}")]
    FrameMismatch {
        /// Method name and descriptor
        method: String,
        /// Instruction index of the frame
        index: usize,
    },

    /// Handler frame stack is not a single reference
    #[error("{method}: handler frame at instruction {index} must hold exactly one reference")]
    BadHandlerFrame {
        /// Method name and descriptor
        method: String,
        /// Handler entry index
        index: usize,
    },

    /// Execution can run past the last instruction
    #[error("{method}: execution falls off the end of the code")]
    FallOffEnd {
        /// Method name and descriptor
        method: String,
    },

    /// Label referenced but never bound
    #[error("{method}: label {label} is never bound")]
    UnboundLabel {
        /// Method name and descriptor
        method: String,
        /// The label
        label: Label,
    },

    /// Two frames declared for one instruction
    #[error("{method}: two frames at instruction {index}")]
    DuplicateFrame {
        /// Method name and descriptor
        method: String,
        /// Instruction index
        index: usize,
    },

    /// Malformed method or member descriptor
    #[error("{method}: invalid descriptor `{descriptor}`")]
    InvalidDescriptor {
        /// Method name and descriptor
        method: String,
        /// The descriptor that failed to parse
        descriptor: String,
    },
}

/// Verify every method of a type
pub fn verify_type(node: &TypeNode) -> Result<(), VerifyError> {
    for method in &node.methods {
        verify_method(&node.header.name, method)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct State {
    locals: Vec<VType>,
    stack: Vec<VType>,
}

impl State {
    fn assignable_to(&self, frame: &State) -> bool {
        self.stack.len() == frame.stack.len()
            && locals_assignable(&self.locals, &frame.locals)
            && self
                .stack
                .iter()
                .zip(&frame.stack)
                .all(|(from, to)| assignable(from, to))
    }
}

fn locals_assignable(from: &[VType], to: &[VType]) -> bool {
    from.iter().zip(to).all(|(from, to)| assignable(from, to))
}

/// Type hierarchy is not consulted: any reference fits any reference slot
fn assignable(from: &VType, to: &VType) -> bool {
    match (from, to) {
        (_, VType::Top) => true,
        (VType::Null, VType::Object(_)) => true,
        (VType::Object(_), VType::Object(_)) => true,
        (from, to) => from == to,
    }
}

/// Verify one method of the type named `owner`
pub fn verify_method(owner: &str, method: &MethodNode) -> Result<(), VerifyError> {
    let id = format!("{}{}", method.info.name, method.info.descriptor);
    let descriptor = parse_descriptor(&id, &method.info.descriptor)?;

    let mut real: Vec<&Insn> = Vec::with_capacity(method.insns.len());
    let mut label_index: FxHashMap<Label, usize> = FxHashMap::default();
    let mut frames: Vec<(usize, &Frame)> = Vec::new();
    for insn in &method.insns {
        match insn {
            Insn::Label(label) => {
                label_index.entry(*label).or_insert(real.len());
            }
            Insn::Frame(frame) => {
                if frames.last().is_some_and(|(at, _)| *at == real.len()) {
                    return Err(VerifyError::DuplicateFrame {
                        method: id,
                        index: real.len(),
                    });
                }
                frames.push((real.len(), frame));
            }
            other => real.push(other),
        }
    }

    if real.is_empty() {
        if method.info.is_abstract() {
            return Ok(());
        }
        return Err(VerifyError::FallOffEnd { method: id });
    }
    let n = real.len();
    let target = |label: Label| {
        label_index
            .get(&label)
            .copied()
            .ok_or_else(|| VerifyError::UnboundLabel {
                method: id.clone(),
                label,
            })
    };

    let this_slots = usize::from(!method.info.is_static());
    let mut max_locals = descriptor.arg_count() + this_slots;
    for insn in &real {
        if let Insn::Iload(slot) | Insn::Istore(slot) | Insn::Aload(slot) | Insn::Astore(slot) =
            insn
        {
            max_locals = max_locals.max(*slot as usize + 1);
        }
    }
    for (_, frame) in &frames {
        if let Frame::Full { locals, .. } = frame {
            max_locals = max_locals.max(locals.len());
        }
    }

    // Implicit frame from the descriptor
    let mut locals = vec![VType::Top; max_locals];
    if this_slots == 1 {
        locals[0] = if method.info.is_constructor() {
            VType::UninitializedThis
        } else {
            VType::Object(owner.to_string())
        };
    }
    for (slot, param) in descriptor.params.iter().enumerate() {
        locals[this_slots + slot] = VType::from_field_type(param);
    }
    let entry = State {
        locals,
        stack: Vec::new(),
    };

    // Declared frames, each relative to the one before
    let mut declared: Vec<Option<State>> = vec![None; n + 1];
    let mut previous = entry.locals.clone();
    for (index, frame) in frames {
        let state = match frame {
            Frame::Same => State {
                locals: previous.clone(),
                stack: Vec::new(),
            },
            Frame::Same1(ty) => State {
                locals: previous.clone(),
                stack: vec![ty.clone()],
            },
            Frame::Full { locals, stack } => {
                let mut locals = locals.clone();
                locals.resize(max_locals, VType::Top);
                State {
                    locals,
                    stack: stack.clone(),
                }
            }
        };
        previous = state.locals.clone();
        declared[index] = Some(state);
    }

    let mut handlers = Vec::with_capacity(method.try_catch_blocks.len());
    for block in &method.try_catch_blocks {
        let start = target(block.start)?;
        let end = target(block.end)?;
        let handler = target(block.handler)?;
        let frame = frame_at(&declared, &id, handler)?;
        if frame.stack.len() != 1 || !matches!(frame.stack[0], VType::Object(_)) {
            return Err(VerifyError::BadHandlerFrame {
                method: id.clone(),
                index: handler,
            });
        }
        handlers.push((start..end, handler, frame));
    }

    let mut checker = Checker {
        method: &id,
        owner,
        ret: descriptor.ret.as_ref(),
        index: 0,
        state: entry,
    };
    let mut reachable = true;
    for (index, insn) in real.iter().enumerate() {
        checker.index = index;
        match &declared[index] {
            Some(frame) => {
                if reachable && !checker.state.assignable_to(frame) {
                    return Err(VerifyError::FrameMismatch {
                        method: id.clone(),
                        index,
                    });
                }
                checker.state = frame.clone();
            }
            None if !reachable => {
                return Err(VerifyError::MissingFrame {
                    method: id.clone(),
                    index,
                })
            }
            None => {}
        }

        for (range, handler, frame) in &handlers {
            if range.contains(&index) && !locals_assignable(&checker.state.locals, &frame.locals) {
                return Err(VerifyError::FrameMismatch {
                    method: id.clone(),
                    index: *handler,
                });
            }
        }

        checker.execute(insn)?;

        if let Some(label) = insn.jump_target() {
            let to = target(label)?;
            if !checker.state.assignable_to(frame_at(&declared, &id, to)?) {
                return Err(VerifyError::FrameMismatch {
                    method: id.clone(),
                    index: to,
                });
            }
        }
        reachable = !insn.opcode().is_some_and(|op| op.is_terminator());
    }

    if reachable {
        return Err(VerifyError::FallOffEnd { method: id });
    }
    Ok(())
}

/// Declared frame at a jump target or handler entry
fn frame_at<'s>(
    declared: &'s [Option<State>],
    method: &str,
    index: usize,
) -> Result<&'s State, VerifyError> {
    // The last slot holds frames bound after the final instruction
    if index + 1 >= declared.len() {
        return Err(VerifyError::FallOffEnd {
            method: method.to_string(),
        });
    }
    declared[index]
        .as_ref()
        .ok_or_else(|| VerifyError::MissingFrame {
            method: method.to_string(),
            index,
        })
}

fn parse_descriptor(method: &str, descriptor: &str) -> Result<MethodDescriptor, VerifyError> {
    MethodDescriptor::parse(descriptor).map_err(|_| VerifyError::InvalidDescriptor {
        method: method.to_string(),
        descriptor: descriptor.to_string(),
    })
}

struct Checker<'a> {
    method: &'a str,
    owner: &'a str,
    ret: Option<&'a FieldType>,
    index: usize,
    state: State,
}

impl Checker<'_> {
    fn pop(&mut self) -> Result<VType, VerifyError> {
        self.state.stack.pop().ok_or_else(|| VerifyError::StackUnderflow {
            method: self.method.to_string(),
            index: self.index,
        })
    }

    fn mismatch(&self, expected: &str, found: VType) -> VerifyError {
        VerifyError::TypeMismatch {
            method: self.method.to_string(),
            index: self.index,
            expected: expected.to_string(),
            found,
        }
    }

    fn pop_int(&mut self) -> Result<(), VerifyError> {
        match self.pop()? {
            VType::Int => Ok(()),
            other => Err(self.mismatch("int", other)),
        }
    }

    /// Any reference, including an uninitialized `this`
    fn pop_ref(&mut self) -> Result<VType, VerifyError> {
        match self.pop()? {
            ty if ty.is_reference() => Ok(ty),
            other => Err(self.mismatch("reference", other)),
        }
    }

    /// An initialized reference
    fn pop_object(&mut self) -> Result<VType, VerifyError> {
        match self.pop()? {
            ty @ (VType::Null | VType::Object(_)) => Ok(ty),
            other => Err(self.mismatch("initialized reference", other)),
        }
    }

    fn pop_value(&mut self, ty: &FieldType) -> Result<(), VerifyError> {
        let expected = VType::from_field_type(ty);
        let found = self.pop()?;
        if assignable(&found, &expected) {
            Ok(())
        } else {
            Err(self.mismatch(&expected.to_string(), found))
        }
    }

    fn push(&mut self, ty: VType) {
        self.state.stack.push(ty);
    }

    fn local(&self, slot: u16) -> Result<&VType, VerifyError> {
        self.state
            .locals
            .get(slot as usize)
            .ok_or_else(|| self.invalid_local(slot))
    }

    fn invalid_local(&self, slot: u16) -> VerifyError {
        VerifyError::InvalidLocal {
            method: self.method.to_string(),
            index: self.index,
            slot,
        }
    }

    fn store(&mut self, slot: u16, ty: VType) -> Result<(), VerifyError> {
        match self.state.locals.get_mut(slot as usize) {
            Some(local) => {
                *local = ty;
                Ok(())
            }
            None => Err(self.invalid_local(slot)),
        }
    }

    fn field_type(&self, descriptor: &str) -> Result<FieldType, VerifyError> {
        FieldType::parse(descriptor).map_err(|_| VerifyError::InvalidDescriptor {
            method: self.method.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    fn check_return(&self, ok: bool) -> Result<(), VerifyError> {
        if ok {
            Ok(())
        } else {
            Err(VerifyError::ReturnMismatch {
                method: self.method.to_string(),
                index: self.index,
            })
        }
    }

    fn execute(&mut self, insn: &Insn) -> Result<(), VerifyError> {
        match insn {
            Insn::Nop | Insn::Goto(_) | Insn::Label(_) | Insn::Frame(_) => {}
            Insn::Pop => {
                self.pop()?;
            }
            Insn::Dup => {
                let top = self.pop()?;
                self.push(top.clone());
                self.push(top);
            }
            Insn::Swap => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.push(a);
                self.push(b);
            }
            Insn::AconstNull => self.push(VType::Null),
            Insn::Iconst(_) => self.push(VType::Int),
            Insn::Ldc(_) => self.push(VType::Object(STRING.to_string())),
            Insn::Iload(slot) => match self.local(*slot)? {
                VType::Int => self.push(VType::Int),
                _ => return Err(self.invalid_local(*slot)),
            },
            Insn::Aload(slot) => {
                let ty = self.local(*slot)?.clone();
                if !ty.is_reference() {
                    return Err(self.invalid_local(*slot));
                }
                self.push(ty);
            }
            Insn::Istore(slot) => {
                self.pop_int()?;
                self.store(*slot, VType::Int)?;
            }
            Insn::Astore(slot) => {
                let ty = self.pop_ref()?;
                self.store(*slot, ty)?;
            }
            Insn::Iadd | Insn::Isub | Insn::Imul | Insn::Idiv => {
                self.pop_int()?;
                self.pop_int()?;
                self.push(VType::Int);
            }
            Insn::Ineg => {
                self.pop_int()?;
                self.push(VType::Int);
            }
            Insn::Ifeq(_) | Insn::Ifne(_) => self.pop_int()?,
            Insn::Ifnull(_) | Insn::Ifnonnull(_) => {
                self.pop_object()?;
            }
            Insn::Return => self.check_return(self.ret.is_none())?,
            Insn::Ireturn => {
                self.check_return(matches!(self.ret, Some(FieldType::Int | FieldType::Boolean)))?;
                self.pop_int()?;
            }
            Insn::Areturn => {
                self.check_return(matches!(self.ret, Some(FieldType::Object(_))))?;
                self.pop_object()?;
            }
            Insn::Athrow => {
                self.pop_object()?;
            }
            Insn::Getfield(member) => {
                let ty = self.field_type(&member.descriptor)?;
                self.pop_object()?;
                self.push(VType::from_field_type(&ty));
            }
            Insn::Putfield(member) => {
                let ty = self.field_type(&member.descriptor)?;
                self.pop_value(&ty)?;
                // Constructors may store into their own fields before `this` is initialized
                self.pop_ref()?;
            }
            Insn::Getstatic(member) => {
                let ty = self.field_type(&member.descriptor)?;
                self.push(VType::from_field_type(&ty));
            }
            Insn::Putstatic(member) => {
                let ty = self.field_type(&member.descriptor)?;
                self.pop_value(&ty)?;
            }
            Insn::Invokevirtual(member) | Insn::Invokespecial(member) | Insn::Invokestatic(member) => {
                let descriptor = parse_descriptor(self.method, &member.descriptor)?;
                for param in descriptor.params.iter().rev() {
                    self.pop_value(param)?;
                }
                match insn {
                    Insn::Invokespecial(_) if member.is_constructor() => {
                        if self.pop_ref()? == VType::UninitializedThis {
                            self.initialize_this();
                        }
                    }
                    Insn::Invokevirtual(_) | Insn::Invokespecial(_) => {
                        self.pop_object()?;
                    }
                    _ => {}
                }
                if let Some(ret) = &descriptor.ret {
                    self.push(VType::from_field_type(ret));
                }
            }
            Insn::New(ty) => self.push(VType::Object(ty.clone())),
            Insn::Checkcast(ty) => {
                self.pop_object()?;
                self.push(VType::Object(ty.clone()));
            }
            Insn::Instanceof(_) => {
                self.pop_object()?;
                self.push(VType::Int);
            }
        }
        Ok(())
    }

    fn initialize_this(&mut self) {
        let this = VType::Object(self.owner.to_string());
        for slot in self
            .state
            .locals
            .iter_mut()
            .chain(self.state.stack.iter_mut())
        {
            if *slot == VType::UninitializedThis {
                *slot = this.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MethodBuilder, TypeBuilder};
    use crate::descriptor::{OBJECT, THROWABLE};
    use crate::image::access;
    use crate::insn::MemberRef;

    fn verify_one(
        access: u16,
        name: &str,
        descriptor: &str,
        body: impl FnOnce(&mut MethodBuilder),
    ) -> Result<(), VerifyError> {
        let node = TypeBuilder::new("demo/Subject")
            .method(access, name, descriptor, body)
            .build();
        verify_type(&node)
    }

    fn super_init() -> Insn {
        Insn::Invokespecial(MemberRef::new(OBJECT, "<init>", "()V"))
    }

    #[test]
    fn test_simple_method() {
        let result = verify_one(access::PUBLIC | access::STATIC, "add", "(II)I", |m| {
            m.emit(Insn::Iload(0))
                .emit(Insn::Iload(1))
                .emit(Insn::Iadd)
                .emit(Insn::Ireturn);
        });
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_stack_underflow() {
        let result = verify_one(access::STATIC, "bad", "()V", |m| {
            m.emit(Insn::Iadd).emit(Insn::Return);
        });
        assert!(matches!(
            result,
            Err(VerifyError::StackUnderflow { index: 0, .. })
        ));
    }

    #[test]
    fn test_category_mismatch() {
        let result = verify_one(access::STATIC, "bad", "()I", |m| {
            m.emit(Insn::Ldc("x".into()))
                .emit(Insn::Iconst(1))
                .emit(Insn::Iadd)
                .emit(Insn::Ireturn);
        });
        assert!(matches!(result, Err(VerifyError::TypeMismatch { index: 2, .. })));
    }

    #[test]
    fn test_return_mismatch() {
        let result = verify_one(access::STATIC, "bad", "()I", |m| {
            m.emit(Insn::Return);
        });
        assert!(matches!(result, Err(VerifyError::ReturnMismatch { .. })));
    }

    #[test]
    fn test_uninitialized_local() {
        let result = verify_one(access::STATIC, "bad", "()I", |m| {
            m.emit(Insn::Iload(3)).emit(Insn::Ireturn);
        });
        assert!(matches!(
            result,
            Err(VerifyError::InvalidLocal { slot: 3, .. })
        ));
    }

    #[test]
    fn test_falls_off_end() {
        let result = verify_one(access::STATIC, "bad", "()V", |m| {
            m.emit(Insn::Nop);
        });
        assert!(matches!(result, Err(VerifyError::FallOffEnd { .. })));
    }

    #[test]
    fn test_jump_target_needs_frame() {
        let result = verify_one(access::STATIC, "bad", "(I)V", |m| {
            let done = m.new_label();
            m.emit(Insn::Iload(0))
                .emit(Insn::Ifeq(done))
                .emit(Insn::Nop)
                .label(done)
                .emit(Insn::Return);
        });
        assert!(matches!(
            result,
            Err(VerifyError::MissingFrame { index: 3, .. })
        ));
    }

    #[test]
    fn test_frame_mismatch() {
        let result = verify_one(access::STATIC, "bad", "(I)V", |m| {
            let done = m.new_label();
            m.emit(Insn::Iconst(7))
                .emit(Insn::Iload(0))
                .emit(Insn::Ifeq(done))
                .emit(Insn::Pop)
                .emit(Insn::Return)
                .label(done)
                .frame(Frame::Same)
                .emit(Insn::Return);
        });
        assert!(matches!(
            result,
            Err(VerifyError::FrameMismatch { index: 5, .. })
        ));
    }

    #[test]
    fn test_code_after_goto_needs_frame() {
        let result = verify_one(access::STATIC, "bad", "()V", |m| {
            let end = m.new_label();
            m.emit(Insn::Goto(end))
                .emit(Insn::Nop)
                .label(end)
                .frame(Frame::Same)
                .emit(Insn::Return);
        });
        assert!(matches!(
            result,
            Err(VerifyError::MissingFrame { index: 1, .. })
        ));
    }

    #[test]
    fn test_handler_frame_shape() {
        let result = verify_one(access::STATIC, "bad", "()V", |m| {
            let start = m.new_label();
            let end = m.new_label();
            let handler = m.new_label();
            m.try_catch(start, end, handler, None)
                .label(start)
                .emit(Insn::Nop)
                .label(end)
                .emit(Insn::Return)
                .label(handler)
                .frame(Frame::Same)
                .emit(Insn::Return);
        });
        assert!(matches!(result, Err(VerifyError::BadHandlerFrame { .. })));
    }

    #[test]
    fn test_handler_accepted() {
        let result = verify_one(access::STATIC, "guarded", "()V", |m| {
            let start = m.new_label();
            let end = m.new_label();
            let handler = m.new_label();
            m.try_catch(start, end, handler, Some(THROWABLE))
                .label(start)
                .emit(Insn::Invokestatic(MemberRef::new("demo/Hooks", "run", "()V")))
                .label(end)
                .emit(Insn::Return)
                .label(handler)
                .frame(Frame::Same1(VType::Object(THROWABLE.into())))
                .emit(Insn::Athrow);
        });
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_unbound_label() {
        let result = verify_one(access::STATIC, "bad", "()V", |m| {
            let nowhere = m.new_label();
            m.emit(Insn::Goto(nowhere));
        });
        assert!(matches!(result, Err(VerifyError::UnboundLabel { .. })));
    }

    #[test]
    fn test_constructor_initializes_this() {
        let result = verify_one(access::PUBLIC, "<init>", "()V", |m| {
            m.emit(Insn::Aload(0))
                .emit(super_init())
                .emit(Insn::Aload(0))
                .emit(Insn::Invokevirtual(MemberRef::new(
                    "demo/Subject",
                    "bump",
                    "()V",
                )))
                .emit(Insn::Return);
        });
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_virtual_call_on_uninitialized_this() {
        let result = verify_one(access::PUBLIC, "<init>", "()V", |m| {
            m.emit(Insn::Aload(0))
                .emit(Insn::Invokevirtual(MemberRef::new(
                    "demo/Subject",
                    "bump",
                    "()V",
                )))
                .emit(Insn::Aload(0))
                .emit(super_init())
                .emit(Insn::Return);
        });
        assert!(matches!(
            result,
            Err(VerifyError::TypeMismatch {
                index: 1,
                found: VType::UninitializedThis,
                ..
            })
        ));
    }

    #[test]
    fn test_abstract_method_without_code() {
        let result = verify_one(access::PUBLIC | access::ABSTRACT, "shape", "()I", |_| {});
        assert_eq!(result, Ok(()));
    }
}
