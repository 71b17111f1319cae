//! Built-in types every VM starts with

use graft_bytecode::descriptor::{CONSTRUCTOR_NAME, OBJECT, STRING, THROWABLE, VOID_DESCRIPTOR};
use graft_bytecode::{access, Insn, MemberRef, TypeBuilder, TypeNode};

/// Name of the message field of `std/Throwable`
pub const MESSAGE_FIELD: &str = "message";

fn object_init() -> Insn {
    Insn::Invokespecial(MemberRef::new(OBJECT, CONSTRUCTOR_NAME, VOID_DESCRIPTOR))
}

/// `std/Object` and `std/Throwable`, in load order
pub fn types() -> Vec<TypeNode> {
    let string = format!("L{};", STRING);
    let message = MemberRef::new(THROWABLE, MESSAGE_FIELD, string.clone());

    let object = TypeBuilder::new(OBJECT)
        .super_type(None)
        .method(access::PUBLIC, CONSTRUCTOR_NAME, VOID_DESCRIPTOR, |m| {
            m.emit(Insn::Return);
        })
        .build();

    let throwable = TypeBuilder::new(THROWABLE)
        .field(access::PRIVATE, MESSAGE_FIELD, &string)
        .method(access::PUBLIC, CONSTRUCTOR_NAME, VOID_DESCRIPTOR, |m| {
            m.emit(Insn::Aload(0)).emit(object_init()).emit(Insn::Return);
        })
        .method(
            access::PUBLIC,
            CONSTRUCTOR_NAME,
            &format!("({})V", string),
            |m| {
                m.emit(Insn::Aload(0))
                    .emit(object_init())
                    .emit(Insn::Aload(0))
                    .emit(Insn::Aload(1))
                    .emit(Insn::Putfield(message.clone()))
                    .emit(Insn::Return);
            },
        )
        .method(access::PUBLIC, "getMessage", &format!("(){}", string), |m| {
            m.emit(Insn::Aload(0))
                .emit(Insn::Getfield(message.clone()))
                .emit(Insn::Areturn);
        })
        .build();

    vec![object, throwable]
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_bytecode::verify_type;

    #[test]
    fn test_builtins_verify() {
        for node in types() {
            assert_eq!(verify_type(&node), Ok(()), "{}", node.header.name);
        }
    }
}
