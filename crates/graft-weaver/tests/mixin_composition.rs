//! Mixin composition end to end: weave, verify, load and run

mod common;

use common::*;
use graft_bytecode::{
    access, disassemble, verify_type, Frame, Insn, MemberRef, TypeBuilder, TypeNode, VType,
};
use graft_vm::Value;
use graft_weaver::{
    DirectoryResolver, InMemoryResolver, MixinDescription, TransformPlan, Transformer,
    TypeDescriptor, WeaveError,
};
use std::sync::Arc;

fn counting_plan() -> TransformPlan {
    TransformPlan::new().mixin(
        MixinDescription::new(TypeDescriptor::class(COUNTING)).with_initializer("bump"),
    )
}

fn woven() -> Vec<u8> {
    Transformer::new(Arc::new(resolver()))
        .transform(&widget(), &counting_plan())
        .unwrap()
}

#[test]
fn test_initializer_placement() {
    let node = TypeNode::decode(&woven()).unwrap();
    let bump = Insn::Invokevirtual(MemberRef::new(WIDGET, "bump", "()V"));

    let delegating: Vec<_> = node.method("<init>", "()V").unwrap().code().collect();
    assert!(!delegating.contains(&&bump));

    let real: Vec<_> = node.method("<init>", "(I)V").unwrap().code().collect();
    assert_eq!(real.iter().filter(|i| ***i == bump).count(), 1);
    assert_eq!(real[real.len() - 3], &Insn::Aload(0));
    assert_eq!(real[real.len() - 2], &bump);
    assert_eq!(real[real.len() - 1], &Insn::Return);
}

#[test]
fn test_initializer_runs_once_per_construction() {
    let (vm, reports) = vm();
    vm.define_type(&woven()).unwrap();

    let widget = vm.instantiate(WIDGET, "()V", &[]).unwrap();
    assert_eq!(vm.get_field(&widget, "count").unwrap(), Value::Int(1));
    assert_eq!(vm.get_field(&widget, "size").unwrap(), Value::Int(0));

    let sized = vm.instantiate(WIDGET, "(I)V", &[Value::Int(5)]).unwrap();
    assert_eq!(vm.get_field(&sized, "count").unwrap(), Value::Int(1));
    assert_eq!(vm.get_field(&sized, "size").unwrap(), Value::Int(5));
    assert!(reports.take().is_empty());
}

#[test]
fn test_copied_methods_run_against_target() {
    let (vm, _) = vm();
    vm.define_type(&woven()).unwrap();
    let widget = vm.instantiate(WIDGET, "()V", &[]).unwrap();

    let returned = vm
        .invoke_virtual(&widget, "touch", "()Ldemo/Widget;", &[])
        .unwrap();
    assert_eq!(returned, Some(widget.clone()));
    let count = vm.invoke_virtual(&widget, "count", "()I", &[]).unwrap();
    assert_eq!(count, Some(Value::Int(2)));
}

#[test]
fn test_donor_name_fully_replaced() {
    let node = TypeNode::decode(&woven()).unwrap();
    assert_eq!(verify_type(&node), Ok(()));

    let text = disassemble(&node);
    assert!(!text.contains(COUNTING), "{}", text);
    assert!(node.method("touch", "()Ldemo/Widget;").is_some());
    for name in ["bump", "count", "touch"] {
        assert!(node.methods.iter().any(|m| m.info.name == name));
    }
    assert!(node.field("count").is_some());
    // the donor's constructor is never copied
    assert_eq!(
        node.methods.iter().filter(|m| m.info.is_constructor()).count(),
        2
    );
}

#[test]
fn test_plain_mixin_leaves_constructors_alone() {
    let plan = TransformPlan::new().mixin(MixinDescription::new(TypeDescriptor::class(COUNTING)));
    let out = Transformer::new(Arc::new(resolver()))
        .transform(&widget(), &plan)
        .unwrap();

    let (vm, _) = vm();
    vm.define_type(&out).unwrap();
    let widget = vm.instantiate(WIDGET, "()V", &[]).unwrap();
    assert_eq!(vm.get_field(&widget, "count").unwrap(), Value::Int(0));
}

#[test]
fn test_missing_donor_aborts() {
    let transformer = Transformer::new(Arc::new(InMemoryResolver::new()));
    let err = transformer.transform(&widget(), &counting_plan()).unwrap_err();
    assert!(matches!(err, WeaveError::DonorNotFound(name) if name == COUNTING));
}

#[test]
fn test_missing_initializer_aborts() {
    let plan = TransformPlan::new().mixin(
        MixinDescription::new(TypeDescriptor::class(COUNTING)).with_initializer("reset"),
    );
    let err = Transformer::new(Arc::new(resolver()))
        .transform(&widget(), &plan)
        .unwrap_err();
    assert!(matches!(err, WeaveError::MissingInitializer { .. }));
}

#[test]
fn test_donor_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = DirectoryResolver::image_path(dir.path(), COUNTING);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, counting()).unwrap();

    let transformer = Transformer::new(Arc::new(DirectoryResolver::new(dir.path())));
    let out = transformer.transform(&widget(), &counting_plan()).unwrap();
    assert_eq!(out, woven());
}

#[test]
fn test_composing_twice_duplicates_members() {
    let plan = TransformPlan::new()
        .mixin(MixinDescription::new(TypeDescriptor::class(COUNTING)))
        .mixin(MixinDescription::new(TypeDescriptor::class(COUNTING)));
    let transformer = Transformer::with_config(
        Arc::new(resolver()),
        &graft_weaver::WeaveConfig {
            verify_output: false,
            ..Default::default()
        },
    );
    let node = TypeNode::decode(&transformer.transform(&widget(), &plan).unwrap()).unwrap();
    assert_eq!(node.fields.iter().filter(|f| f.name == "count").count(), 2);
}

/// `Widget(int)` as in the shared fixture, plus a `Widget()` given by `body`
fn widget_with(body: impl FnOnce(&mut graft_bytecode::MethodBuilder)) -> Vec<u8> {
    TypeBuilder::new(WIDGET)
        .field(access::PRIVATE, "size", "I")
        .field(access::PRIVATE, "next", "Ldemo/Widget;")
        .method(access::PUBLIC, "<init>", "()V", body)
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

fn count_after_construction(target: &[u8]) -> (graft_vm::Vm, Value) {
    let out = Transformer::new(Arc::new(resolver()))
        .transform(target, &counting_plan())
        .unwrap();
    let (vm, _) = vm();
    vm.define_type(&out).unwrap();
    let widget = vm.instantiate(WIDGET, "()V", &[]).unwrap();
    (vm, widget)
}

#[test]
fn test_building_another_instance_is_not_delegation() {
    // Widget() { super(); this.next = new Widget(5); }
    let target = widget_with(|m| {
        m.emit(Insn::Aload(0))
            .emit(object_init())
            .emit(Insn::Aload(0))
            .emit(Insn::New(WIDGET.into()))
            .emit(Insn::Dup)
            .emit(Insn::Iconst(5))
            .emit(Insn::Invokespecial(MemberRef::new(WIDGET, "<init>", "(I)V")))
            .emit(Insn::Putfield(MemberRef::new(WIDGET, "next", "Ldemo/Widget;")))
            .emit(Insn::Return);
    });
    let (vm, widget) = count_after_construction(&target);

    assert_eq!(vm.get_field(&widget, "count").unwrap(), Value::Int(1));
    let inner = vm.get_field(&widget, "next").unwrap();
    assert_eq!(vm.get_field(&inner, "count").unwrap(), Value::Int(1));
    assert_eq!(vm.get_field(&inner, "size").unwrap(), Value::Int(5));
}

#[test]
fn test_return_laid_out_before_delegation() {
    // Widget() { goto call; exit: return; call: this(0); goto exit; }
    let target = widget_with(|m| {
        let call = m.new_label();
        let exit = m.new_label();
        m.emit(Insn::Goto(call))
            .label(exit)
            .frame(Frame::Full {
                locals: vec![VType::Object(WIDGET.into())],
                stack: vec![],
            })
            .emit(Insn::Return)
            .label(call)
            .frame(Frame::Full {
                locals: vec![VType::UninitializedThis],
                stack: vec![],
            })
            .emit(Insn::Aload(0))
            .emit(Insn::Iconst(0))
            .emit(Insn::Invokespecial(MemberRef::new(WIDGET, "<init>", "(I)V")))
            .emit(Insn::Goto(exit));
    });
    let (vm, widget) = count_after_construction(&target);

    assert_eq!(vm.get_field(&widget, "count").unwrap(), Value::Int(1));
}
