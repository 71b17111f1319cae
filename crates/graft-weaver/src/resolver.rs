//! Donor resolution
//!
//! The weaver never decides where donor types live. A [`DonorResolver`] is
//! handed in by the embedder and asked for raw image bytes each time a mixin
//! is composed. Resolvers are shared across threads and must not cache.

use crate::mixin::TypeDescriptor;
use rustc_hash::FxHashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// File extension of type images on disk
pub const IMAGE_EXTENSION: &str = "gti";

/// Donor lookup failures
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No resolver knows the type
    #[error("Type {0} not found")]
    NotFound(String),

    /// The type exists but reading it failed
    #[error("Failed to read type {name}: {source}")]
    Io {
        /// Internal name of the type
        name: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Source of donor type images
pub trait DonorResolver: Send + Sync {
    /// Return the image bytes of `donor`
    fn resolve(&self, donor: &TypeDescriptor) -> Result<Vec<u8>, ResolveError>;
}

impl<R: DonorResolver + ?Sized> DonorResolver for Arc<R> {
    fn resolve(&self, donor: &TypeDescriptor) -> Result<Vec<u8>, ResolveError> {
        (**self).resolve(donor)
    }
}

impl<R: DonorResolver + ?Sized> DonorResolver for Box<R> {
    fn resolve(&self, donor: &TypeDescriptor) -> Result<Vec<u8>, ResolveError> {
        (**self).resolve(donor)
    }
}

/// Images held in memory, keyed by internal name
#[derive(Debug, Clone, Default)]
pub struct InMemoryResolver {
    images: FxHashMap<String, Vec<u8>>,
}

impl InMemoryResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the image of `name`, replacing any previous one
    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(name.into(), bytes);
    }

    /// Builder form of [`InMemoryResolver::insert`]
    pub fn with(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl DonorResolver for InMemoryResolver {
    fn resolve(&self, donor: &TypeDescriptor) -> Result<Vec<u8>, ResolveError> {
        self.images
            .get(donor.name())
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(donor.name().to_string()))
    }
}

/// Images stored as `<root>/<internal name>.gti` under one or more roots
///
/// Roots are searched in order; the first hit wins.
#[derive(Debug, Clone, Default)]
pub struct DirectoryResolver {
    roots: Vec<PathBuf>,
}

impl DirectoryResolver {
    /// Resolve from a single root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    /// Add another search root after the existing ones
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Path an image of `name` would have under `root`
    pub fn image_path(root: &Path, name: &str) -> PathBuf {
        root.join(format!("{}.{}", name, IMAGE_EXTENSION))
    }
}

impl DonorResolver for DirectoryResolver {
    fn resolve(&self, donor: &TypeDescriptor) -> Result<Vec<u8>, ResolveError> {
        for root in &self.roots {
            let path = Self::image_path(root, donor.name());
            match std::fs::read(&path) {
                Ok(bytes) => {
                    trace!(donor = donor.name(), path = %path.display(), "resolved donor from disk");
                    return Ok(bytes);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(ResolveError::Io {
                        name: donor.name().to_string(),
                        source,
                    })
                }
            }
        }
        Err(ResolveError::NotFound(donor.name().to_string()))
    }
}

/// Try `primary`, fall back to `secondary` when it does not know the type
///
/// Read failures from `primary` are reported, not skipped.
pub struct FallbackResolver {
    primary: Box<dyn DonorResolver>,
    secondary: Box<dyn DonorResolver>,
}

impl FallbackResolver {
    /// Chain two resolvers
    pub fn new(
        primary: impl DonorResolver + 'static,
        secondary: impl DonorResolver + 'static,
    ) -> Self {
        Self {
            primary: Box::new(primary),
            secondary: Box::new(secondary),
        }
    }
}

impl DonorResolver for FallbackResolver {
    fn resolve(&self, donor: &TypeDescriptor) -> Result<Vec<u8>, ResolveError> {
        match self.primary.resolve(donor) {
            Err(ResolveError::NotFound(_)) => self.secondary.resolve(donor),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting() -> TypeDescriptor {
        TypeDescriptor::class("demo/Counting")
    }

    #[test]
    fn test_in_memory() {
        let resolver = InMemoryResolver::new().with("demo/Counting", vec![1, 2, 3]);
        assert_eq!(resolver.resolve(&counting()).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            resolver.resolve(&TypeDescriptor::class("demo/Other")),
            Err(ResolveError::NotFound(name)) if name == "demo/Other"
        ));
    }

    #[test]
    fn test_directory_searches_roots_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(second.path().join("demo")).unwrap();
        std::fs::write(
            DirectoryResolver::image_path(second.path(), "demo/Counting"),
            b"second",
        )
        .unwrap();

        let resolver = DirectoryResolver::new(first.path()).with_root(second.path());
        assert_eq!(resolver.resolve(&counting()).unwrap(), b"second");

        std::fs::create_dir_all(first.path().join("demo")).unwrap();
        std::fs::write(
            DirectoryResolver::image_path(first.path(), "demo/Counting"),
            b"first",
        )
        .unwrap();
        assert_eq!(resolver.resolve(&counting()).unwrap(), b"first");
    }

    #[test]
    fn test_directory_not_found() {
        let root = tempfile::tempdir().unwrap();
        let resolver = DirectoryResolver::new(root.path());
        assert!(matches!(
            resolver.resolve(&counting()),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_directory_read_failure_is_io() {
        let root = tempfile::tempdir().unwrap();
        // A directory where the file should be cannot be read as one
        std::fs::create_dir_all(DirectoryResolver::image_path(root.path(), "demo/Counting"))
            .unwrap();
        let resolver = DirectoryResolver::new(root.path());
        assert!(matches!(
            resolver.resolve(&counting()),
            Err(ResolveError::Io { .. })
        ));
    }

    #[test]
    fn test_fallback() {
        let resolver = FallbackResolver::new(
            InMemoryResolver::new().with("demo/Primary", vec![1]),
            InMemoryResolver::new()
                .with("demo/Primary", vec![9])
                .with("demo/Counting", vec![2]),
        );
        assert_eq!(
            resolver
                .resolve(&TypeDescriptor::class("demo/Primary"))
                .unwrap(),
            vec![1]
        );
        assert_eq!(resolver.resolve(&counting()).unwrap(), vec![2]);
        assert!(resolver
            .resolve(&TypeDescriptor::class("demo/Missing"))
            .is_err());
    }
}
