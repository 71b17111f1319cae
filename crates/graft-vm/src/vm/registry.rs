//! Loaded types and native hooks

use crate::object::Class;
use crate::value::Value;
use crate::{VmError, VmResult};
use graft_bytecode::descriptor::OBJECT;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Every loaded type, by internal name
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: RwLock<FxHashMap<String, Arc<Class>>>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a linked type; names are never redefined
    pub fn insert(&self, class: Class) -> VmResult<Arc<Class>> {
        let mut classes = self.classes.write();
        if classes.contains_key(&class.name) {
            return Err(VmError::DuplicateType(class.name));
        }
        let class = Arc::new(class);
        classes.insert(class.name.clone(), class.clone());
        Ok(class)
    }

    /// Look up a type
    pub fn get(&self, name: &str) -> Option<Arc<Class>> {
        self.classes.read().get(name).cloned()
    }

    /// Look up a type that must be loaded
    pub fn require(&self, name: &str) -> VmResult<Arc<Class>> {
        self.get(name)
            .ok_or_else(|| VmError::ClassNotFound(name.to_string()))
    }

    /// Check if a type is loaded
    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// Number of loaded types
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// Check if no type is loaded
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    /// Check if `sub` is `sup` or one of its descendants
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sup == OBJECT || sub == sup {
            return true;
        }
        let mut current = self.get(sub);
        while let Some(class) = current {
            match class.super_name.as_deref() {
                Some(name) if name == sup => return true,
                Some(name) => current = self.get(name),
                None => return false,
            }
        }
        false
    }

    /// Types from `name` up to the root
    pub fn ancestry(&self, name: &str) -> Vec<Arc<Class>> {
        let mut chain = Vec::new();
        let mut current = self.get(name);
        while let Some(class) = current {
            current = class.super_name.as_deref().and_then(|s| self.get(s));
            chain.push(class);
        }
        chain
    }
}

/// Host function standing in for a method body
pub type NativeFn = Arc<dyn Fn(&[Value]) -> VmResult<Option<Value>> + Send + Sync>;

/// Native hooks keyed by owner, name and descriptor
#[derive(Default)]
pub struct NativeRegistry {
    natives: RwLock<FxHashMap<(String, String, String), NativeFn>>,
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("count", &self.natives.read().len())
            .finish()
    }
}

impl NativeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook, replacing any previous one
    pub fn register(&self, owner: &str, name: &str, descriptor: &str, f: NativeFn) {
        self.natives.write().insert(
            (owner.to_string(), name.to_string(), descriptor.to_string()),
            f,
        );
    }

    /// Look up a hook
    pub fn get(&self, owner: &str, name: &str, descriptor: &str) -> Option<NativeFn> {
        self.natives
            .read()
            .get(&(owner.to_string(), name.to_string(), descriptor.to_string()))
            .cloned()
    }
}
