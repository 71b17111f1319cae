//! Human-readable listing of a type
//!
//! Used in test failure messages and debug logging.

use crate::image::access;
use crate::node::{MethodNode, TypeNode};
use std::fmt::Write;

fn flags(bits: u16) -> String {
    const NAMES: [(u16, &str); 8] = [
        (access::PUBLIC, "public"),
        (access::PRIVATE, "private"),
        (access::PROTECTED, "protected"),
        (access::STATIC, "static"),
        (access::FINAL, "final"),
        (access::INTERFACE, "interface"),
        (access::ABSTRACT, "abstract"),
        (access::SYNTHETIC, "synthetic"),
    ];
    NAMES
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| format!("{} ", name))
        .collect()
}

/// List a whole type
pub fn disassemble(node: &TypeNode) -> String {
    let mut out = String::new();
    let _ = write!(out, "type {}{}", flags(node.header.access), node.header.name);
    if let Some(super_name) = &node.header.super_name {
        let _ = write!(out, " extends {}", super_name);
    }
    out.push('\n');

    for field in &node.fields {
        let _ = writeln!(out, "  field {}{} {}", flags(field.access), field.name, field.descriptor);
    }
    for method in &node.methods {
        out.push_str(&disassemble_method(method));
    }
    out
}

/// List one method
pub fn disassemble_method(method: &MethodNode) -> String {
    let mut out = String::new();
    let info = &method.info;
    let _ = writeln!(
        out,
        "  method {}{}{}",
        flags(info.access),
        info.name,
        info.descriptor
    );
    for block in &method.try_catch_blocks {
        let _ = writeln!(
            out,
            "    TRYCATCH {} {} {} {}",
            block.start,
            block.end,
            block.handler,
            block.catch_type.as_deref().unwrap_or("any")
        );
    }
    for insn in &method.insns {
        let _ = writeln!(out, "    {}", insn);
    }
    out
}
