//! Virtual machine interpreter

use super::bootstrap::{self, MESSAGE_FIELD};
use super::registry::{ClassRegistry, NativeRegistry};
use crate::object::{Class, Method, Object, ObjectRef};
use crate::value::Value;
use crate::{VmError, VmResult};
use graft_bytecode::descriptor::{CONSTRUCTOR_NAME, THROWABLE};
use graft_bytecode::{verify_type, Insn, MethodDescriptor, TypeNode};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Deepest call nesting before execution is aborted
pub const MAX_CALL_DEPTH: usize = 256;

/// How a call stopped other than by returning
enum Unwind {
    /// A managed exception in flight
    Throw(ObjectRef),
    /// A VM failure; never caught by managed handlers
    Fatal(VmError),
}

impl From<VmError> for Unwind {
    fn from(err: VmError) -> Self {
        Unwind::Fatal(err)
    }
}

type Exec<T> = Result<T, Unwind>;

enum Step {
    Next,
    Jump(usize),
    Return(Option<Value>),
}

/// Graft virtual machine
///
/// Every entry point takes `&self`; loaded types and natives sit behind
/// locks, so one VM can be driven from several threads.
#[derive(Debug)]
pub struct Vm {
    classes: ClassRegistry,
    natives: NativeRegistry,
}

impl Vm {
    /// Create a VM with the built-in types loaded
    pub fn new() -> VmResult<Self> {
        let vm = Self {
            classes: ClassRegistry::new(),
            natives: NativeRegistry::new(),
        };
        for node in bootstrap::types() {
            vm.define_node(&node)?;
        }
        Ok(vm)
    }

    /// Loaded types
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Decode, verify and load a type image, returning the type's name
    pub fn define_type(&self, bytes: &[u8]) -> VmResult<String> {
        let node = TypeNode::decode(bytes)?;
        self.define_node(&node)?;
        Ok(node.header.name)
    }

    /// Verify and load a decoded type
    ///
    /// The supertype must already be loaded.
    pub fn define_node(&self, node: &TypeNode) -> VmResult<()> {
        let name = &node.header.name;
        verify_type(node).map_err(|source| {
            warn!(type_name = %name, error = %source, "rejected type");
            VmError::Verify {
                name: name.clone(),
                source,
            }
        })?;
        if let Some(super_name) = &node.header.super_name {
            if !self.classes.contains(super_name) {
                return Err(VmError::ClassNotFound(super_name.clone()));
            }
        }
        self.classes.insert(Class::link(node)?)?;
        debug!(
            type_name = %name,
            fields = node.fields.len(),
            methods = node.methods.len(),
            "loaded type"
        );
        Ok(())
    }

    /// Provide the body of `owner.name descriptor` from the host
    ///
    /// Natives take precedence over bytecode and may be registered for
    /// types that are never loaded.
    pub fn register_native<F>(&self, owner: &str, name: &str, descriptor: &str, f: F)
    where
        F: Fn(&[Value]) -> VmResult<Option<Value>> + Send + Sync + 'static,
    {
        self.natives.register(owner, name, descriptor, Arc::new(f));
    }

    /// Allocate an instance of `class` and run the constructor `descriptor`
    pub fn instantiate(&self, class: &str, descriptor: &str, args: &[Value]) -> VmResult<Value> {
        self.finish(self.construct(class, descriptor, args.to_vec(), 0))
    }

    /// Call an instance method with virtual dispatch on `receiver`
    pub fn invoke_virtual(
        &self,
        receiver: &Value,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> VmResult<Option<Value>> {
        let class = receiver.class_name().ok_or(VmError::NullPointer)?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(receiver.clone());
        full.extend_from_slice(args);
        self.finish(self.call(&class, name, descriptor, full, 0))
    }

    /// Call a static method
    pub fn invoke_static(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> VmResult<Option<Value>> {
        self.finish(self.call(owner, name, descriptor, args.to_vec(), 0))
    }

    /// Read an instance field
    pub fn get_field(&self, object: &Value, name: &str) -> VmResult<Value> {
        let object = object.as_object().ok_or(VmError::NullPointer)?.lock();
        object
            .get_field(name)
            .ok_or_else(|| VmError::FieldNotFound {
                owner: object.class.clone(),
                name: name.to_string(),
            })
    }

    /// Read a static field
    pub fn get_static(&self, owner: &str, name: &str) -> VmResult<Value> {
        self.classes
            .require(owner)?
            .get_static(name)
            .ok_or_else(|| VmError::FieldNotFound {
                owner: owner.to_string(),
                name: name.to_string(),
            })
    }

    fn finish<T>(&self, result: Exec<T>) -> VmResult<T> {
        result.map_err(|unwind| match unwind {
            Unwind::Fatal(err) => err,
            Unwind::Throw(exception) => {
                let exception = exception.lock();
                let message = exception
                    .get_field(MESSAGE_FIELD)
                    .and_then(|m| m.as_str().map(str::to_string))
                    .unwrap_or_else(|| "null".to_string());
                VmError::Uncaught {
                    class: exception.class.clone(),
                    message,
                }
            }
        })
    }

    /// New object of `class` with every instance field at its default
    fn allocate(&self, class: &str) -> VmResult<ObjectRef> {
        let ancestry = self.classes.ancestry(class);
        if ancestry.is_empty() {
            return Err(VmError::ClassNotFound(class.to_string()));
        }
        let mut object = Object::new(class);
        for ty in ancestry.iter().rev() {
            for field in ty.instance_fields() {
                object.set_field(field.name.clone(), Value::default_for(&field.descriptor));
            }
        }
        Ok(Arc::new(Mutex::new(object)))
    }

    fn construct(&self, class: &str, descriptor: &str, args: Vec<Value>, depth: usize) -> Exec<Value> {
        let object = Value::Ref(self.allocate(class)?);
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(object.clone());
        full.extend(args);
        self.call(class, CONSTRUCTOR_NAME, descriptor, full, depth)?;
        Ok(object)
    }

    /// A `std/Throwable` raised by the VM itself
    fn throw(&self, message: &str) -> Unwind {
        match self.allocate(THROWABLE) {
            Ok(exception) => {
                exception
                    .lock()
                    .set_field(MESSAGE_FIELD, Value::string(message));
                Unwind::Throw(exception)
            }
            Err(err) => Unwind::Fatal(err),
        }
    }

    fn is_instance(&self, value: &Value, ty: &str) -> bool {
        value
            .class_name()
            .is_some_and(|class| self.classes.is_subtype(&class, ty))
    }

    /// Run `name descriptor`, looked up from `start` towards the root
    fn call(
        &self,
        start: &str,
        name: &str,
        descriptor: &str,
        args: Vec<Value>,
        depth: usize,
    ) -> Exec<Option<Value>> {
        if let Some(native) = self.natives.get(start, name, descriptor) {
            return Ok(native(&args)?);
        }
        let ancestry = self.classes.ancestry(start);
        if ancestry.is_empty() {
            return Err(VmError::ClassNotFound(start.to_string()).into());
        }
        for class in ancestry {
            if let Some(native) = self.natives.get(&class.name, name, descriptor) {
                return Ok(native(&args)?);
            }
            if let Some(method) = class.method(name, descriptor) {
                if method.code.is_empty() {
                    return Err(VmError::AbstractMethod(format!(
                        "{}.{}{}",
                        class.name, name, descriptor
                    ))
                    .into());
                }
                return self.execute(&class, method, args, depth + 1);
            }
        }
        Err(VmError::MethodNotFound {
            owner: start.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
        .into())
    }

    fn execute(
        &self,
        class: &Class,
        method: &Method,
        args: Vec<Value>,
        depth: usize,
    ) -> Exec<Option<Value>> {
        if depth > MAX_CALL_DEPTH {
            return Err(VmError::StackOverflow.into());
        }
        trace!(owner = %class.name, method = %method.info.name, depth, "enter");

        let mut locals = args;
        let size = locals.len().max(method.max_locals);
        locals.resize(size, Value::Null);
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;

        loop {
            let insn = method.code.get(pc).ok_or_else(|| {
                VmError::RuntimeError(format!(
                    "{}.{} ran past its last instruction",
                    class.name, method.info.name
                ))
            })?;
            match self.step(insn, method, &mut locals, &mut stack, depth) {
                Ok(Step::Next) => pc += 1,
                Ok(Step::Jump(target)) => pc = target,
                Ok(Step::Return(value)) => return Ok(value),
                Err(Unwind::Throw(exception)) => {
                    let thrown = exception.lock().class.clone();
                    let handler = method.handlers.iter().find(|h| {
                        h.covers(pc)
                            && h
                                .catch_type
                                .as_deref()
                                .map_or(true, |ty| self.classes.is_subtype(&thrown, ty))
                    });
                    match handler {
                        Some(handler) => {
                            trace!(owner = %class.name, method = %method.info.name, exception = %thrown, "caught");
                            stack.clear();
                            stack.push(Value::Ref(exception));
                            pc = handler.target;
                        }
                        None => return Err(Unwind::Throw(exception)),
                    }
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    fn step(
        &self,
        insn: &Insn,
        method: &Method,
        locals: &mut [Value],
        stack: &mut Vec<Value>,
        depth: usize,
    ) -> Exec<Step> {
        match insn {
            Insn::Nop | Insn::Label(_) | Insn::Frame(_) => {}
            Insn::Pop => {
                pop(stack)?;
            }
            Insn::Dup => {
                let top = pop(stack)?;
                stack.push(top.clone());
                stack.push(top);
            }
            Insn::Swap => {
                let a = pop(stack)?;
                let b = pop(stack)?;
                stack.push(a);
                stack.push(b);
            }
            Insn::AconstNull => stack.push(Value::Null),
            Insn::Iconst(value) => stack.push(Value::Int(*value)),
            Insn::Ldc(s) => stack.push(Value::string(s)),
            Insn::Iload(slot) | Insn::Aload(slot) => {
                let value = locals
                    .get(*slot as usize)
                    .cloned()
                    .ok_or(VmError::InvalidLocal(*slot))?;
                stack.push(value);
            }
            Insn::Istore(slot) | Insn::Astore(slot) => {
                let value = pop(stack)?;
                let local = locals
                    .get_mut(*slot as usize)
                    .ok_or(VmError::InvalidLocal(*slot))?;
                *local = value;
            }
            Insn::Iadd | Insn::Isub | Insn::Imul | Insn::Idiv => {
                let b = pop_int(stack)?;
                let a = pop_int(stack)?;
                let result = match insn {
                    Insn::Iadd => a.wrapping_add(b),
                    Insn::Isub => a.wrapping_sub(b),
                    Insn::Imul => a.wrapping_mul(b),
                    _ if b == 0 => return Err(self.throw("/ by zero")),
                    _ => a.wrapping_div(b),
                };
                stack.push(Value::Int(result));
            }
            Insn::Ineg => {
                let a = pop_int(stack)?;
                stack.push(Value::Int(a.wrapping_neg()));
            }
            Insn::Goto(label) => return Ok(Step::Jump(method.target(*label)?)),
            Insn::Ifeq(label) | Insn::Ifne(label) => {
                let zero = pop_int(stack)? == 0;
                if zero == matches!(insn, Insn::Ifeq(_)) {
                    return Ok(Step::Jump(method.target(*label)?));
                }
            }
            Insn::Ifnull(label) | Insn::Ifnonnull(label) => {
                let null = pop(stack)?.is_null();
                if null == matches!(insn, Insn::Ifnull(_)) {
                    return Ok(Step::Jump(method.target(*label)?));
                }
            }
            Insn::Return => return Ok(Step::Return(None)),
            Insn::Ireturn | Insn::Areturn => return Ok(Step::Return(Some(pop(stack)?))),
            Insn::Athrow => {
                return Err(match pop(stack)? {
                    Value::Ref(exception) => Unwind::Throw(exception),
                    Value::Null => self.throw("null"),
                    other => VmError::TypeError(format!("cannot throw {:?}", other)).into(),
                });
            }
            Insn::Getfield(member) => {
                let object = self.pop_object(stack)?;
                let value = object.lock().get_field(&member.name);
                let value = value.ok_or_else(|| VmError::FieldNotFound {
                    owner: member.owner.clone(),
                    name: member.name.clone(),
                })?;
                stack.push(value);
            }
            Insn::Putfield(member) => {
                let value = pop(stack)?;
                let object = self.pop_object(stack)?;
                object.lock().set_field(member.name.clone(), value);
            }
            Insn::Getstatic(member) => {
                let value = self
                    .classes
                    .require(&member.owner)?
                    .get_static(&member.name)
                    .ok_or_else(|| VmError::FieldNotFound {
                        owner: member.owner.clone(),
                        name: member.name.clone(),
                    })?;
                stack.push(value);
            }
            Insn::Putstatic(member) => {
                let value = pop(stack)?;
                if !self.classes.require(&member.owner)?.set_static(&member.name, value) {
                    return Err(VmError::FieldNotFound {
                        owner: member.owner.clone(),
                        name: member.name.clone(),
                    }
                    .into());
                }
            }
            Insn::Invokevirtual(member) | Insn::Invokespecial(member) | Insn::Invokestatic(member) => {
                let descriptor = MethodDescriptor::parse(&member.descriptor)
                    .map_err(|e| VmError::LinkError(e.to_string()))?;
                let has_receiver = !matches!(insn, Insn::Invokestatic(_));
                let count = descriptor.arg_count() + usize::from(has_receiver);
                if stack.len() < count {
                    return Err(VmError::StackUnderflow.into());
                }
                let args = stack.split_off(stack.len() - count);

                let start = match (insn, args.first()) {
                    (Insn::Invokestatic(_), _) => member.owner.clone(),
                    (_, None | Some(Value::Null)) => return Err(self.throw("null")),
                    (Insn::Invokevirtual(_), Some(receiver)) => receiver
                        .class_name()
                        .ok_or_else(|| VmError::TypeError(format!("{:?} has no methods", receiver)))?,
                    _ => member.owner.clone(),
                };
                let result = self.call(&start, &member.name, &member.descriptor, args, depth)?;
                if descriptor.ret.is_some() {
                    stack.push(result.unwrap_or_default());
                }
            }
            Insn::New(ty) => stack.push(Value::Ref(self.allocate(ty)?)),
            Insn::Checkcast(ty) => {
                let top = stack.last().ok_or(VmError::StackUnderflow)?;
                if !top.is_null() && !self.is_instance(top, ty) {
                    let found = top.class_name().unwrap_or_default();
                    return Err(self.throw(&format!("{} cannot be cast to {}", found, ty)));
                }
            }
            Insn::Instanceof(ty) => {
                let value = pop(stack)?;
                stack.push(Value::from(self.is_instance(&value, ty)));
            }
        }
        Ok(Step::Next)
    }

    fn pop_object(&self, stack: &mut Vec<Value>) -> Exec<ObjectRef> {
        match pop(stack)? {
            Value::Ref(object) => Ok(object),
            Value::Null => Err(self.throw("null")),
            other => Err(VmError::TypeError(format!("expected an object, found {:?}", other)).into()),
        }
    }
}

fn pop(stack: &mut Vec<Value>) -> VmResult<Value> {
    stack.pop().ok_or(VmError::StackUnderflow)
}

fn pop_int(stack: &mut Vec<Value>) -> VmResult<i32> {
    match pop(stack)? {
        Value::Int(value) => Ok(value),
        other => Err(VmError::TypeError(format!("expected an int, found {:?}", other))),
    }
}
