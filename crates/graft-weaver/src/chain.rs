//! The mixin stage of the transformation chain
//!
//! Sits in front of the next stage and forwards every event, except that
//! constructors are routed through a [`ConstructorRewriter`] when the mixin
//! has an initializer, and the end of the type triggers composition. Donor
//! members therefore land after the target's own members, and the end event
//! reaches the next stage only once they have been emitted.

use crate::constructor::ConstructorRewriter;
use crate::error::WeaveError;
use crate::mixin::{MixinComposer, MixinDescription};
use crate::resolver::DonorResolver;
use graft_bytecode::{
    FieldInfo, ImageError, MethodInfo, MethodVisitor, TypeHeader, TypeVisitor,
};

/// Type visitor merging one mixin into the type flowing through it
pub struct MixinTypeVisitor<'r, V> {
    next: V,
    description: MixinDescription,
    resolver: &'r dyn DonorResolver,
    target: Option<String>,
}

impl<'r, V: TypeVisitor> MixinTypeVisitor<'r, V> {
    /// Merge `description` into whatever type is sent through `next`
    pub fn new(next: V, description: MixinDescription, resolver: &'r dyn DonorResolver) -> Self {
        Self {
            next,
            description,
            resolver,
            target: None,
        }
    }

    /// Unwrap the next stage
    pub fn into_inner(self) -> V {
        self.next
    }
}

impl<V> TypeVisitor for MixinTypeVisitor<'_, V>
where
    V: TypeVisitor,
    WeaveError: From<V::Error>,
{
    type Error = WeaveError;

    fn visit_header(&mut self, header: &TypeHeader) {
        self.target = Some(header.name.clone());
        self.next.visit_header(header);
    }

    fn visit_field(&mut self, field: &FieldInfo) {
        self.next.visit_field(field);
    }

    fn visit_method<'a>(&'a mut self, method: &MethodInfo) -> Box<dyn MethodVisitor + 'a> {
        let next = self.next.visit_method(method);
        match (&self.description.initializer, &self.target) {
            (Some(initializer), Some(target)) if method.is_constructor() => {
                Box::new(ConstructorRewriter::new(next, target.clone(), initializer))
            }
            _ => next,
        }
    }

    fn visit_end(&mut self) -> Result<(), WeaveError> {
        let target = self
            .target
            .as_deref()
            .ok_or(WeaveError::MalformedTarget(ImageError::MissingHeader))?;
        let composer = MixinComposer::prepare(&self.description, target, self.resolver)?;
        composer.compose(&mut self.next);
        self.next.visit_end()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixin::TypeDescriptor;
    use crate::resolver::InMemoryResolver;
    use graft_bytecode::{access, Insn, MemberRef, TypeBuilder, TypeNode};

    fn donor() -> Vec<u8> {
        TypeBuilder::new("demo/Tagged")
            .field(access::PRIVATE, "tag", "Lstd/String;")
            .method(access::PUBLIC, "tagged", "()V", |m| {
                m.emit(Insn::Aload(0))
                    .emit(Insn::Ldc("on".into()))
                    .emit(Insn::Putfield(MemberRef::new("demo/Tagged", "tag", "Lstd/String;")))
                    .emit(Insn::Return);
            })
            .to_bytes()
            .unwrap()
    }

    fn target() -> TypeNode {
        TypeBuilder::new("demo/Widget")
            .field(access::PRIVATE, "size", "I")
            .method(access::PUBLIC, "<init>", "()V", |m| {
                m.emit(Insn::Aload(0))
                    .emit(Insn::Invokespecial(MemberRef::new("std/Object", "<init>", "()V")))
                    .emit(Insn::Return);
            })
            .build()
    }

    #[test]
    fn test_donor_members_follow_target_members() {
        let resolver = InMemoryResolver::new().with("demo/Tagged", donor());
        let description = MixinDescription::new(TypeDescriptor::class("demo/Tagged"));
        let mut stage = MixinTypeVisitor::new(TypeNode::default(), description, &resolver);
        target().accept(&mut stage).unwrap();
        let out = stage.into_inner();

        let fields: Vec<_> = out.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["size", "tag"]);
        let methods: Vec<_> = out.methods.iter().map(|m| m.info.name.as_str()).collect();
        assert_eq!(methods, vec!["<init>", "tagged"]);
    }

    #[test]
    fn test_constructor_rewritten_only_with_initializer() {
        let resolver = InMemoryResolver::new().with("demo/Tagged", donor());

        let plain = MixinDescription::new(TypeDescriptor::class("demo/Tagged"));
        let mut stage = MixinTypeVisitor::new(TypeNode::default(), plain, &resolver);
        target().accept(&mut stage).unwrap();
        assert_eq!(stage.into_inner().methods[0].code().count(), 3);

        let with_init =
            MixinDescription::new(TypeDescriptor::class("demo/Tagged")).with_initializer("tagged");
        let mut stage = MixinTypeVisitor::new(TypeNode::default(), with_init, &resolver);
        target().accept(&mut stage).unwrap();
        let out = stage.into_inner();
        assert!(out.methods[0].code().any(|i| *i
            == Insn::Invokevirtual(MemberRef::new("demo/Widget", "tagged", "()V"))));
    }

    #[test]
    fn test_failure_stops_before_end_event() {
        let resolver = InMemoryResolver::new();
        let description = MixinDescription::new(TypeDescriptor::class("demo/Tagged"));
        let mut stage = MixinTypeVisitor::new(TypeNode::default(), description, &resolver);
        let err = target().accept(&mut stage).unwrap_err();
        assert!(matches!(err, WeaveError::DonorNotFound(_)));
        // nothing of the donor reached the next stage
        assert_eq!(stage.into_inner().fields.len(), 1);
    }
}
