//! Runtime values

use crate::object::{Object, ObjectRef};
use graft_bytecode::descriptor::STRING;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A value on the operand stack, in a local or in a field
#[derive(Clone, Default)]
pub enum Value {
    /// The null reference
    #[default]
    Null,
    /// 32-bit integer (also booleans)
    Int(i32),
    /// Immutable string
    Str(Arc<str>),
    /// Reference to a heap object
    Ref(ObjectRef),
}

impl Value {
    /// Wrap a freshly allocated object
    pub fn object(object: Object) -> Self {
        Value::Ref(Arc::new(Mutex::new(object)))
    }

    /// Create a string value
    pub fn string(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Default value of a field with the given descriptor
    pub fn default_for(descriptor: &str) -> Self {
        match descriptor {
            "I" | "Z" => Value::Int(0),
            _ => Value::Null,
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Runtime type of a non-null reference
    pub fn class_name(&self) -> Option<String> {
        match self {
            Value::Str(_) => Some(STRING.to_string()),
            Value::Ref(r) => Some(r.lock().class.clone()),
            Value::Null | Value::Int(_) => None,
        }
    }

    /// Check if this is a reference (or null)
    pub fn is_reference(&self) -> bool {
        !matches!(self, Value::Int(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{:?}", s),
            // fields may refer back to the object, so never recurse
            Value::Ref(r) => write!(f, "<{}@{:p}>", r.lock().class, Arc::as_ptr(r)),
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(b as i32)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_identity() {
        let a = Value::object(Object::new("demo/A"));
        let b = Value::object(Object::new("demo/A"));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(Value::string("x"), Value::from("x"));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Value::default_for("I"), Value::Int(0));
        assert_eq!(Value::default_for("Z"), Value::Int(0));
        assert!(Value::default_for("Lstd/String;").is_null());
        assert_eq!(Value::default(), Value::Null);
    }

    #[test]
    fn test_class_name() {
        assert_eq!(Value::string("x").class_name().as_deref(), Some("std/String"));
        assert_eq!(
            Value::object(Object::new("demo/A")).class_name().as_deref(),
            Some("demo/A")
        );
        assert_eq!(Value::Int(1).class_name(), None);
    }
}
