//! Field and method descriptors
//!
//! Field types: `I` (int), `Z` (boolean, int category), `L<internal-name>;`.
//! Method descriptors: `(<params>)<ret>` where `<ret>` may be `V`.

use std::fmt;
use thiserror::Error;

/// Root of the reference hierarchy
pub const OBJECT: &str = "std/Object";
/// Built-in string type
pub const STRING: &str = "std/String";
/// Root of all throwable types
pub const THROWABLE: &str = "std/Throwable";
/// Name shared by every constructor
pub const CONSTRUCTOR_NAME: &str = "<init>";
/// Descriptor of a no-argument, no-result method
pub const VOID_DESCRIPTOR: &str = "()V";

/// Malformed descriptor
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid descriptor `{0}`")]
pub struct DescriptorError(pub String);

/// A value type as written in a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit integer
    Int,
    /// Boolean, stored as an int
    Boolean,
    /// Reference to an instance of the named type
    Object(String),
}

impl FieldType {
    /// Parse a complete field descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        match parse_field_at(descriptor, 0) {
            Some((ty, end)) if end == descriptor.len() => Ok(ty),
            _ => Err(DescriptorError(descriptor.to_string())),
        }
    }

    /// Check if values of this type are references
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => f.write_str("I"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Object(name) => write!(f, "L{};", name),
        }
    }
}

/// Parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for void
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let err = || DescriptorError(descriptor.to_string());
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(err());
        }

        let mut params = Vec::new();
        let mut pos = 1;
        while bytes.get(pos) != Some(&b')') {
            let (ty, next) = parse_field_at(descriptor, pos).ok_or_else(err)?;
            params.push(ty);
            pos = next;
        }
        pos += 1;

        let ret = if &descriptor[pos..] == "V" {
            None
        } else {
            Some(FieldType::parse(&descriptor[pos..]).map_err(|_| err())?)
        };

        Ok(Self { params, ret })
    }

    /// Number of argument values popped by an invocation (receiver excluded)
    pub fn arg_count(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ret) => write!(f, "{}", ret),
            None => f.write_str("V"),
        }
    }
}

fn parse_field_at(descriptor: &str, pos: usize) -> Option<(FieldType, usize)> {
    match descriptor.as_bytes().get(pos)? {
        b'I' => Some((FieldType::Int, pos + 1)),
        b'Z' => Some((FieldType::Boolean, pos + 1)),
        b'L' => {
            let rest = &descriptor[pos + 1..];
            let end = rest.find(';')?;
            if end == 0 {
                return None;
            }
            Some((FieldType::Object(rest[..end].to_string()), pos + 2 + end))
        }
        _ => None,
    }
}
