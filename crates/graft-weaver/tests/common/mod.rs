//! Shared fixtures for the weaver integration tests

#![allow(dead_code)]

use graft_bytecode::{access, Insn, MemberRef, TypeBuilder};
use graft_vm::{Value, Vm};
use graft_weaver::safety_net::{report_descriptor, DEFAULT_REPORT_NAME, DEFAULT_REPORT_OWNER};
use graft_weaver::InMemoryResolver;
use parking_lot::Mutex;
use std::sync::Arc;

pub const WIDGET: &str = "demo/Widget";
pub const COUNTING: &str = "demo/Counting";
pub const GREETER: &str = "demo/Greeter";
pub const ADVICE: &str = "demo/Advice";

pub fn object_init() -> Insn {
    Insn::Invokespecial(MemberRef::new("std/Object", "<init>", "()V"))
}

/// `Widget()` delegates to `this(0)`; `Widget(int)` does the real work
pub fn widget() -> Vec<u8> {
    TypeBuilder::new(WIDGET)
        .field(access::PRIVATE, "size", "I")
        .method(access::PUBLIC, "<init>", "()V", |m| {
            m.emit(Insn::Aload(0))
                .emit(Insn::Iconst(0))
                .emit(Insn::Invokespecial(MemberRef::new(WIDGET, "<init>", "(I)V")))
                .emit(Insn::Return);
        })
        .method(access::PUBLIC, "<init>", "(I)V", |m| {
            m.emit(Insn::Aload(0))
                .emit(object_init())
                .emit(Insn::Aload(0))
                .emit(Insn::Iload(1))
                .emit(Insn::Putfield(MemberRef::new(WIDGET, "size", "I")))
                .emit(Insn::Return);
        })
        .to_bytes()
        .unwrap()
}

/// Donor counting how often `bump` ran
pub fn counting() -> Vec<u8> {
    let count = MemberRef::new(COUNTING, "count", "I");
    TypeBuilder::new(COUNTING)
        .field(access::PRIVATE, "count", "I")
        .method(access::PUBLIC, "<init>", "()V", |m| {
            m.emit(Insn::Aload(0)).emit(object_init()).emit(Insn::Return);
        })
        .method(access::PUBLIC, "bump", "()V", |m| {
            m.emit(Insn::Aload(0))
                .emit(Insn::Aload(0))
                .emit(Insn::Getfield(count.clone()))
                .emit(Insn::Iconst(1))
                .emit(Insn::Iadd)
                .emit(Insn::Putfield(count.clone()))
                .emit(Insn::Return);
        })
        .method(access::PUBLIC, "count", "()I", |m| {
            m.emit(Insn::Aload(0))
                .emit(Insn::Getfield(count.clone()))
                .emit(Insn::Ireturn);
        })
        .method(access::PUBLIC, "touch", "()Ldemo/Counting;", |m| {
            m.emit(Insn::Aload(0))
                .emit(Insn::Invokevirtual(MemberRef::new(COUNTING, "bump", "()V")))
                .emit(Insn::Aload(0))
                .emit(Insn::Areturn);
        })
        .to_bytes()
        .unwrap()
}

/// `greet(n)` returns `n * 2`
pub fn greeter() -> Vec<u8> {
    TypeBuilder::new(GREETER)
        .method(access::PUBLIC, "<init>", "()V", |m| {
            m.emit(Insn::Aload(0)).emit(object_init()).emit(Insn::Return);
        })
        .method(access::PUBLIC, "greet", "(I)I", |m| {
            m.emit(Insn::Iload(1))
                .emit(Insn::Iconst(2))
                .emit(Insn::Imul)
                .emit(Insn::Ireturn);
        })
        .to_bytes()
        .unwrap()
}

/// Static advice methods: one divides by zero, one throws a fresh
/// throwable after stashing it in `last`, one only counts its calls
pub fn advice() -> Vec<u8> {
    let last = MemberRef::new(ADVICE, "last", "Lstd/Throwable;");
    let calls = MemberRef::new(ADVICE, "calls", "I");
    TypeBuilder::new(ADVICE)
        .field(access::STATIC, "last", "Lstd/Throwable;")
        .field(access::STATIC, "calls", "I")
        .method(access::PUBLIC | access::STATIC, "explode", "()V", |m| {
            m.emit(Insn::Iconst(1))
                .emit(Insn::Iconst(0))
                .emit(Insn::Idiv)
                .emit(Insn::Pop)
                .emit(Insn::Return);
        })
        .method(access::PUBLIC | access::STATIC, "raise", "()V", |m| {
            m.emit(Insn::New("std/Throwable".into()))
                .emit(Insn::Dup)
                .emit(Insn::Ldc("advice failed".into()))
                .emit(Insn::Invokespecial(MemberRef::new(
                    "std/Throwable",
                    "<init>",
                    "(Lstd/String;)V",
                )))
                .emit(Insn::Dup)
                .emit(Insn::Putstatic(last.clone()))
                .emit(Insn::Athrow);
        })
        .method(access::PUBLIC | access::STATIC, "quiet", "()V", |m| {
            m.emit(Insn::Getstatic(calls.clone()))
                .emit(Insn::Iconst(1))
                .emit(Insn::Iadd)
                .emit(Insn::Putstatic(calls.clone()))
                .emit(Insn::Return);
        })
        .to_bytes()
        .unwrap()
}

pub fn advice_ref(name: &str) -> MemberRef {
    MemberRef::new(ADVICE, name, "()V")
}

pub fn resolver() -> InMemoryResolver {
    InMemoryResolver::new().with(COUNTING, counting())
}

/// Everything a reporting hook received
#[derive(Clone, Default)]
pub struct Reports(Arc<Mutex<Vec<(String, Value)>>>);

impl Reports {
    /// Install as the native `owner.name(message, cause)` on `vm`
    pub fn install(&self, vm: &Vm, owner: &str, name: &str) {
        let sink = self.0.clone();
        vm.register_native(owner, name, &report_descriptor(), move |args| {
            let message = args[0].as_str().unwrap_or_default().to_string();
            sink.lock().push((message, args[1].clone()));
            Ok(None)
        });
    }

    /// Install at the default hook
    pub fn install_default(&self, vm: &Vm) {
        self.install(vm, DEFAULT_REPORT_OWNER, DEFAULT_REPORT_NAME);
    }

    pub fn take(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut *self.0.lock())
    }
}

/// A fresh VM with the default reporting hook recorded
pub fn vm() -> (Vm, Reports) {
    let vm = Vm::new().unwrap();
    let reports = Reports::default();
    reports.install_default(&vm);
    (vm, reports)
}
