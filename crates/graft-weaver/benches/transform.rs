use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use graft_bytecode::{access, Insn, MemberRef, TypeBuilder, TypeNode};
use graft_weaver::{
    AdviceBinding, InMemoryResolver, MixinDescription, TransformPlan, Transformer,
    TypeDescriptor,
};
use std::sync::Arc;

fn object_init() -> Insn {
    Insn::Invokespecial(MemberRef::new("std/Object", "<init>", "()V"))
}

/// Target with `methods` arithmetic methods
fn target(methods: usize) -> Vec<u8> {
    let mut builder = TypeBuilder::new("bench/Target").method(access::PUBLIC, "<init>", "()V", |m| {
        m.emit(Insn::Aload(0)).emit(object_init()).emit(Insn::Return);
    });
    for i in 0..methods {
        builder = builder.method(access::PUBLIC, &format!("m{}", i), "(I)I", |m| {
            m.emit(Insn::Iload(1))
                .emit(Insn::Iconst(i as i32))
                .emit(Insn::Iadd)
                .emit(Insn::Ireturn);
        });
    }
    builder.to_bytes().unwrap()
}

fn donor() -> Vec<u8> {
    let field = MemberRef::new("bench/Donor", "state", "I");
    TypeBuilder::new("bench/Donor")
        .field(access::PRIVATE, "state", "I")
        .method(access::PUBLIC, "init", "()V", |m| {
            m.emit(Insn::Aload(0))
                .emit(Insn::Iconst(1))
                .emit(Insn::Putfield(field.clone()))
                .emit(Insn::Return);
        })
        .to_bytes()
        .unwrap()
}

fn bench_decode(c: &mut Criterion) {
    let bytes = target(32);
    c.bench_function("decode_32_methods", |b| {
        b.iter(|| TypeNode::decode(black_box(&bytes)).unwrap());
    });
}

fn bench_transform(c: &mut Criterion) {
    let resolver = InMemoryResolver::new().with("bench/Donor", donor());
    let transformer = Transformer::new(Arc::new(resolver));
    let mixin = TransformPlan::new().mixin(
        MixinDescription::new(TypeDescriptor::class("bench/Donor")).with_initializer("init"),
    );

    let mut group = c.benchmark_group("transform");
    for methods in [4usize, 32, 128] {
        let bytes = target(methods);
        group.bench_with_input(BenchmarkId::new("mixin", methods), &bytes, |b, bytes| {
            b.iter(|| transformer.transform(black_box(bytes), &mixin).unwrap());
        });

        let mut advised = TransformPlan::new();
        for i in 0..methods {
            advised = advised.advice(AdviceBinding::new(
                format!("m{}", i),
                MemberRef::new("bench/Hooks", "enter", "()V"),
            ));
        }
        group.bench_with_input(BenchmarkId::new("advice", methods), &bytes, |b, bytes| {
            b.iter(|| transformer.transform(black_box(bytes), &advised).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_transform);
criterion_main!(benches);
