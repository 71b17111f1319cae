//! Object model and loaded types

use crate::value::Value;
use crate::{VmError, VmResult};
use graft_bytecode::{
    access, FieldInfo, Insn, Label, MethodDescriptor, MethodInfo, MethodNode, TypeNode,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Shared handle to a heap object
pub type ObjectRef = Arc<Mutex<Object>>;

/// Object instance
#[derive(Debug, Clone)]
pub struct Object {
    /// Runtime type
    pub class: String,
    /// Instance field values by name
    pub fields: FxHashMap<String, Value>,
}

impl Object {
    /// Create an object with no fields
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: FxHashMap::default(),
        }
    }

    /// Get a field value
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    /// Set a field value
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

/// Exception handler with instruction indices
#[derive(Debug, Clone)]
pub struct Handler {
    /// First covered instruction
    pub start: usize,
    /// First instruction past the covered range
    pub end: usize,
    /// Handler entry
    pub target: usize,
    /// Caught type, `None` catches everything
    pub catch_type: Option<String>,
}

impl Handler {
    /// Check if the handler covers instruction `pc`
    pub fn covers(&self, pc: usize) -> bool {
        self.start <= pc && pc < self.end
    }
}

/// A method linked for execution
///
/// Pseudo-instructions are stripped; labels resolve to instruction indices.
#[derive(Debug, Clone)]
pub struct Method {
    /// Signature and flags
    pub info: MethodInfo,
    /// Real instructions
    pub code: Vec<Insn>,
    /// Exception table, innermost first
    pub handlers: Vec<Handler>,
    /// Number of local slots
    pub max_locals: usize,
    labels: FxHashMap<Label, usize>,
}

impl Method {
    /// Link a method of `owner`
    pub fn link(owner: &str, node: &MethodNode) -> VmResult<Self> {
        let mut labels = FxHashMap::default();
        let mut code = Vec::with_capacity(node.insns.len());
        for insn in &node.insns {
            match insn {
                Insn::Label(label) => {
                    labels.entry(*label).or_insert(code.len());
                }
                Insn::Frame(_) => {}
                other => code.push(other.clone()),
            }
        }

        let id = || format!("{}.{}{}", owner, node.info.name, node.info.descriptor);
        let resolve = |label: Label| {
            labels
                .get(&label)
                .copied()
                .ok_or_else(|| VmError::LinkError(format!("{}: unbound label {}", id(), label)))
        };
        let handlers = node
            .try_catch_blocks
            .iter()
            .map(|block| {
                Ok(Handler {
                    start: resolve(block.start)?,
                    end: resolve(block.end)?,
                    target: resolve(block.handler)?,
                    catch_type: block.catch_type.clone(),
                })
            })
            .collect::<VmResult<Vec<_>>>()?;

        let descriptor = MethodDescriptor::parse(&node.info.descriptor)
            .map_err(|e| VmError::LinkError(format!("{}: {}", id(), e)))?;
        let params = descriptor.arg_count() + usize::from(!node.info.is_static());
        let max_locals = code
            .iter()
            .filter_map(|insn| match insn {
                Insn::Iload(slot) | Insn::Istore(slot) | Insn::Aload(slot) | Insn::Astore(slot) => {
                    Some(*slot as usize + 1)
                }
                _ => None,
            })
            .fold(params, usize::max);

        Ok(Self {
            info: node.info.clone(),
            code,
            handlers,
            max_locals,
            labels,
        })
    }

    /// Instruction index of `label`
    pub fn target(&self, label: Label) -> VmResult<usize> {
        self.labels.get(&label).copied().ok_or_else(|| {
            VmError::LinkError(format!("{}: unbound label {}", self.info.name, label))
        })
    }
}

/// A loaded type
#[derive(Debug)]
pub struct Class {
    /// Internal name
    pub name: String,
    /// Supertype, `None` only for the root type
    pub super_name: Option<String>,
    /// Access flags
    pub access: u16,
    /// Declared fields, static and instance
    pub fields: Vec<FieldInfo>,
    methods: Vec<Method>,
    statics: Mutex<FxHashMap<String, Value>>,
}

impl Class {
    /// Link every method of `node`
    pub fn link(node: &TypeNode) -> VmResult<Self> {
        let methods = node
            .methods
            .iter()
            .map(|m| Method::link(&node.header.name, m))
            .collect::<VmResult<Vec<_>>>()?;
        let statics = node
            .fields
            .iter()
            .filter(|f| f.access & access::STATIC != 0)
            .map(|f| (f.name.clone(), Value::default_for(&f.descriptor)))
            .collect();

        Ok(Self {
            name: node.header.name.clone(),
            super_name: node.header.super_name.clone(),
            access: node.header.access,
            fields: node.fields.clone(),
            methods,
            statics: Mutex::new(statics),
        })
    }

    /// Find a declared method
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.info.name == name && m.info.descriptor == descriptor)
    }

    /// Declared instance fields
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldInfo> + '_ {
        self.fields.iter().filter(|f| f.access & access::STATIC == 0)
    }

    /// Read a static field
    pub fn get_static(&self, name: &str) -> Option<Value> {
        self.statics.lock().get(name).cloned()
    }

    /// Write a static field
    pub fn set_static(&self, name: &str, value: Value) -> bool {
        match self.statics.lock().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}
