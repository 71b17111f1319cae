//! Constant pool for type images
//!
//! Strings (names, descriptors, literals) and member references are interned
//! so every distinct value is stored once per image.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;

/// A member reference as stored in the pool: indices into the string table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberEntry {
    /// Owner internal name
    pub owner: u32,
    /// Member name
    pub name: u32,
    /// Member descriptor
    pub descriptor: u32,
}

/// Constant pool containing interned strings and member references
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// String constants
    pub strings: Vec<String>,
    /// Member reference constants
    pub members: Vec<MemberEntry>,
    string_index: FxHashMap<String, u32>,
    member_index: FxHashMap<MemberEntry, u32>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string and return its index
    pub fn add_string(&mut self, s: &str) -> u32 {
        if let Some(&index) = self.string_index.get(s) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), index);
        index
    }

    /// Intern a member reference and return its index
    pub fn add_member(&mut self, owner: &str, name: &str, descriptor: &str) -> u32 {
        let entry = MemberEntry {
            owner: self.add_string(owner),
            name: self.add_string(name),
            descriptor: self.add_string(descriptor),
        };
        if let Some(&index) = self.member_index.get(&entry) {
            return index;
        }
        let index = self.members.len() as u32;
        self.members.push(entry);
        self.member_index.insert(entry, index);
        index
    }

    /// Get a string constant by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| s.as_str())
    }

    /// Get a member reference by index, resolved to its strings
    pub fn get_member(&self, index: u32) -> Option<(&str, &str, &str)> {
        let entry = self.members.get(index as usize)?;
        Some((
            self.get_string(entry.owner)?,
            self.get_string(entry.name)?,
            self.get_string(entry.descriptor)?,
        ))
    }

    /// Encode the constant pool
    ///
    /// Format:
    /// - String count (u32), then each string length-prefixed
    /// - Member count (u32), then each member as three u32 string indices
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }

        writer.emit_u32(self.members.len() as u32);
        for member in &self.members {
            writer.emit_u32(member.owner);
            writer.emit_u32(member.name);
            writer.emit_u32(member.descriptor);
        }
    }

    /// Decode the constant pool
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let mut pool = ConstantPool::new();

        let string_count = reader.read_u32()? as usize;
        pool.strings.reserve(string_count.min(reader.remaining()));
        for _ in 0..string_count {
            let s = reader.read_string()?;
            pool.string_index.entry(s.clone()).or_insert(pool.strings.len() as u32);
            pool.strings.push(s);
        }

        let member_count = reader.read_u32()? as usize;
        for _ in 0..member_count {
            let entry = MemberEntry {
                owner: reader.read_u32()?,
                name: reader.read_u32()?,
                descriptor: reader.read_u32()?,
            };
            pool.member_index.entry(entry).or_insert(pool.members.len() as u32);
            pool.members.push(entry);
        }

        Ok(pool)
    }
}
