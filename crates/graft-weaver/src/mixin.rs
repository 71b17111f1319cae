//! Mixin descriptions and composition
//!
//! Composition copies a donor's fields and non-constructor methods into the
//! target, rewriting every reference to the donor so the copied code talks
//! about the target instead.

use crate::error::WeaveError;
use crate::remap::{RemappingMethodVisitor, SymbolRemapper};
use crate::resolver::DonorResolver;
use graft_bytecode::descriptor::VOID_DESCRIPTOR;
use graft_bytecode::{MethodInfo, TypeHeader, TypeNode, TypeVisitor};
use std::fmt;
use tracing::debug;

/// Whether a type is a class or an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Concrete or abstract class
    Class,
    /// Interface
    Interface,
}

/// Identity of a type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    name: String,
    kind: TypeKind,
}

impl TypeDescriptor {
    /// Create a descriptor
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Descriptor of a class
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Class)
    }

    /// Descriptor of an interface
    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Interface)
    }

    /// Descriptor of a decoded type
    pub fn of(header: &TypeHeader) -> Self {
        let kind = if header.is_interface() {
            TypeKind::Interface
        } else {
            TypeKind::Class
        };
        Self::new(header.name.clone(), kind)
    }

    /// Internal name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class or interface
    pub fn kind(&self) -> TypeKind {
        self.kind
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A donor to merge into a target, with its optional initializer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixinDescription {
    /// The donor type
    pub mixin: TypeDescriptor,
    /// Name of a `()V` instance method of the donor run once per construction
    pub initializer: Option<String>,
}

impl MixinDescription {
    /// Mixin without an initializer
    pub fn new(mixin: TypeDescriptor) -> Self {
        Self {
            mixin,
            initializer: None,
        }
    }

    /// Set the initializer
    pub fn with_initializer(mut self, name: impl Into<String>) -> Self {
        self.initializer = Some(name.into());
        self
    }
}

/// A donor that has been resolved, decoded and checked
#[derive(Debug)]
pub struct MixinComposer {
    donor: TypeNode,
    remapper: SymbolRemapper,
}

impl MixinComposer {
    /// Load the donor of `description` for merging into `target`
    ///
    /// Every check happens here, so a composer that exists can always emit.
    pub fn prepare(
        description: &MixinDescription,
        target: &str,
        resolver: &dyn DonorResolver,
    ) -> Result<Self, WeaveError> {
        let name = description.mixin.name();
        let bytes = resolver.resolve(&description.mixin)?;
        let donor = TypeNode::decode(&bytes).map_err(|source| WeaveError::MalformedDonor {
            name: name.to_string(),
            source,
        })?;

        if let Some(initializer) = &description.initializer {
            let found = donor
                .method(initializer, VOID_DESCRIPTOR)
                .is_some_and(|m| !m.info.is_static());
            if !found {
                return Err(WeaveError::MissingInitializer {
                    donor: name.to_string(),
                    name: initializer.clone(),
                });
            }
        }

        Ok(Self {
            remapper: SymbolRemapper::single(donor.header.name.clone(), target),
            donor,
        })
    }

    /// Append the donor's fields and non-constructor methods to `next`
    pub fn compose<V: TypeVisitor + ?Sized>(&self, next: &mut V) {
        for field in &self.donor.fields {
            next.visit_field(field);
        }

        let mut copied = 0usize;
        for method in &self.donor.methods {
            if method.info.is_constructor() {
                continue;
            }
            let info = MethodInfo {
                access: method.info.access,
                name: method.info.name.clone(),
                descriptor: self.remapper.map_descriptor(&method.info.descriptor),
            };
            let mut mv = next.visit_method(&info);
            method.accept(&mut RemappingMethodVisitor::new(&mut *mv, &self.remapper));
            copied += 1;
        }

        debug!(
            donor = %self.donor.header.name,
            fields = self.donor.fields.len(),
            methods = copied,
            "composed mixin"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::InMemoryResolver;
    use graft_bytecode::{access, Insn, MemberRef, TypeBuilder};

    fn counting() -> Vec<u8> {
        TypeBuilder::new("demo/Counting")
            .field(access::PRIVATE, "count", "I")
            .method(access::PUBLIC, "<init>", "()V", |m| {
                m.emit(Insn::Aload(0))
                    .emit(Insn::Invokespecial(MemberRef::new("std/Object", "<init>", "()V")))
                    .emit(Insn::Return);
            })
            .method(access::PUBLIC, "bump", "()V", |m| {
                m.emit(Insn::Aload(0))
                    .emit(Insn::Aload(0))
                    .emit(Insn::Getfield(MemberRef::new("demo/Counting", "count", "I")))
                    .emit(Insn::Iconst(1))
                    .emit(Insn::Iadd)
                    .emit(Insn::Putfield(MemberRef::new("demo/Counting", "count", "I")))
                    .emit(Insn::Return);
            })
            .method(access::PUBLIC | access::STATIC, "helper", "()V", |m| {
                m.emit(Insn::Return);
            })
            .to_bytes()
            .unwrap()
    }

    fn resolver() -> InMemoryResolver {
        InMemoryResolver::new().with("demo/Counting", counting())
    }

    #[test]
    fn test_compose_copies_members() {
        let description = MixinDescription::new(TypeDescriptor::class("demo/Counting"));
        let composer = MixinComposer::prepare(&description, "demo/Widget", &resolver()).unwrap();

        let mut out = TypeNode::default();
        composer.compose(&mut out);

        assert_eq!(out.fields.len(), 1);
        assert_eq!(out.fields[0].name, "count");
        let names: Vec<_> = out.methods.iter().map(|m| m.info.name.as_str()).collect();
        assert_eq!(names, vec!["bump", "helper"]);
        assert!(out.methods[0]
            .code()
            .filter_map(|i| i.member())
            .all(|m| m.owner == "demo/Widget"));
    }

    #[test]
    fn test_missing_donor() {
        let description = MixinDescription::new(TypeDescriptor::class("demo/Nowhere"));
        let err = MixinComposer::prepare(&description, "demo/Widget", &resolver()).unwrap_err();
        assert!(matches!(err, WeaveError::DonorNotFound(name) if name == "demo/Nowhere"));
    }

    #[test]
    fn test_malformed_donor() {
        let resolver = InMemoryResolver::new().with("demo/Counting", b"junk".to_vec());
        let description = MixinDescription::new(TypeDescriptor::class("demo/Counting"));
        let err = MixinComposer::prepare(&description, "demo/Widget", &resolver).unwrap_err();
        assert!(matches!(err, WeaveError::MalformedDonor { .. }));
    }

    #[test]
    fn test_initializer_must_exist() {
        let description =
            MixinDescription::new(TypeDescriptor::class("demo/Counting")).with_initializer("reset");
        let err = MixinComposer::prepare(&description, "demo/Widget", &resolver()).unwrap_err();
        assert!(matches!(
            err,
            WeaveError::MissingInitializer { name, .. } if name == "reset"
        ));
    }

    #[test]
    fn test_static_initializer_rejected() {
        let description =
            MixinDescription::new(TypeDescriptor::class("demo/Counting")).with_initializer("helper");
        assert!(MixinComposer::prepare(&description, "demo/Widget", &resolver()).is_err());
    }

    #[test]
    fn test_descriptor_kinds() {
        let header = TypeHeader {
            access: access::PUBLIC | access::INTERFACE | access::ABSTRACT,
            name: "demo/Shape".into(),
            super_name: None,
        };
        assert_eq!(TypeDescriptor::of(&header).kind(), TypeKind::Interface);
        assert_eq!(TypeDescriptor::class("demo/Widget").kind(), TypeKind::Class);
        assert_eq!(TypeDescriptor::interface("demo/Shape").to_string(), "demo/Shape");
    }
}
