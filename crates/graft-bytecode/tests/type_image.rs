//! Integration tests for type images: assemble, encode, decode, verify

use graft_bytecode::{
    access, disassemble, verify_type, DecodeError, Frame, ImageError, Insn, MemberRef, TypeBuilder,
    TypeImage, TypeNode, VType,
};

const THROWABLE: &str = "std/Throwable";

/// A type exercising branches, handlers and every frame kind
fn sample() -> TypeNode {
    TypeBuilder::new("demo/Sample")
        .field(access::PRIVATE, "total", "I")
        .field(access::PUBLIC | access::STATIC, "label", "Lstd/String;")
        .method(access::PUBLIC, "<init>", "()V", |m| {
            m.emit(Insn::Aload(0))
                .emit(Insn::Invokespecial(MemberRef::new(
                    "std/Object",
                    "<init>",
                    "()V",
                )))
                .emit(Insn::Return);
        })
        .method(access::PUBLIC, "clamp", "(I)I", |m| {
            let negative = m.new_label();
            m.emit(Insn::Iload(1))
                .emit(Insn::Iconst(0))
                .emit(Insn::Isub)
                .emit(Insn::Ifeq(negative))
                .emit(Insn::Iload(1))
                .emit(Insn::Ireturn)
                .label(negative)
                .frame(Frame::Same)
                .emit(Insn::Iconst(0))
                .emit(Insn::Ireturn);
        })
        .method(access::PUBLIC, "safe", "()I", |m| {
            let start = m.new_label();
            let end = m.new_label();
            let handler = m.new_label();
            m.try_catch(start, end, handler, Some(THROWABLE))
                .label(start)
                .emit(Insn::Aload(0))
                .emit(Insn::Getfield(MemberRef::new("demo/Sample", "total", "I")))
                .emit(Insn::Iconst(2))
                .emit(Insn::Idiv)
                .emit(Insn::Ireturn)
                .label(end)
                .label(handler)
                .frame(Frame::Full {
                    locals: vec![VType::Object("demo/Sample".into())],
                    stack: vec![VType::Object(THROWABLE.into())],
                })
                .emit(Insn::Pop)
                .emit(Insn::Iconst(-1))
                .emit(Insn::Ireturn);
        })
        .build()
}

#[test]
fn test_roundtrip_preserves_structure() {
    let node = sample();
    let bytes = node.to_bytes().expect("assemble");
    let decoded = TypeNode::decode(&bytes).expect("decode");

    assert_eq!(decoded.header, node.header);
    assert_eq!(decoded.fields, node.fields);
    assert_eq!(decoded.methods.len(), 3);
    assert_eq!(decoded.method("clamp", "(I)I"), node.method("clamp", "(I)I"));

    let safe = decoded.method("safe", "()I").unwrap();
    assert_eq!(safe.try_catch_blocks.len(), 1);
    assert_eq!(safe.try_catch_blocks[0].catch_type.as_deref(), Some(THROWABLE));
    // `end` and `handler` share an offset, so they come back as one label
    assert_eq!(safe.try_catch_blocks[0].end, safe.try_catch_blocks[0].handler);
    assert!(safe.insns.iter().any(|i| matches!(i, Insn::Frame(Frame::Full { .. }))));
}

#[test]
fn test_reencode_is_stable() {
    let bytes = sample().to_bytes().unwrap();
    let again = TypeNode::decode(&bytes).unwrap().to_bytes().unwrap();
    assert_eq!(bytes, again);
}

#[test]
fn test_sample_verifies() {
    let decoded = TypeNode::decode(&sample().to_bytes().unwrap()).unwrap();
    assert_eq!(verify_type(&decoded), Ok(()));
}

#[test]
fn test_corrupted_payload_rejected() {
    let mut bytes = sample().to_bytes().unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] = bytes[middle].wrapping_add(1);
    assert!(matches!(
        TypeNode::decode(&bytes),
        Err(ImageError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_invalid_opcode_rejected() {
    let mut image = TypeImage::decode(&sample().to_bytes().unwrap()).unwrap();
    image.methods[0].code[0] = 0xEE;
    let bytes = image.encode();
    assert!(matches!(
        TypeNode::decode(&bytes),
        Err(ImageError::Decode(DecodeError::InvalidOpcode(0xEE, 0)))
    ));
}

#[test]
fn test_truncated_code_rejected() {
    let mut image = TypeImage::decode(&sample().to_bytes().unwrap()).unwrap();
    image.methods[0].code.truncate(2);
    let bytes = image.encode();
    assert!(matches!(
        TypeNode::decode(&bytes),
        Err(ImageError::Decode(DecodeError::UnexpectedEnd(_)))
    ));
}

#[test]
fn test_disassembly_mentions_every_member() {
    let listing = disassemble(&sample());
    assert!(listing.starts_with("type public demo/Sample extends std/Object\n"));
    assert!(listing.contains("field private total I"));
    assert!(listing.contains("method public safe()I"));
    assert!(listing.contains("TRYCATCH L0 L1 L2 std/Throwable"));
    assert!(listing.contains("FRAME FULL [demo/Sample] [std/Throwable]"));
}
