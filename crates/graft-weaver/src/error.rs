//! Weaver errors

use crate::resolver::ResolveError;
use graft_bytecode::{ImageError, VerifyError};
use thiserror::Error;

/// Errors that abort a transformation
///
/// A transformation either produces a complete type or one of these; a
/// partially merged type is never returned.
#[derive(Debug, Error)]
pub enum WeaveError {
    /// The donor resolution hook has no bytes for the donor
    #[error("Mixin donor {0} not found")]
    DonorNotFound(String),

    /// The donor exists but could not be read
    #[error("Failed to read mixin donor {name}: {source}")]
    DonorUnreadable {
        /// Donor internal name
        name: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The donor bytes are not a valid type image
    #[error("Mixin donor {name} is malformed: {source}")]
    MalformedDonor {
        /// Donor internal name
        name: String,
        /// Decode error
        #[source]
        source: ImageError,
    },

    /// The named initializer is not a `()V` instance method of the donor
    #[error("Mixin donor {donor} has no instance initializer {name}()V")]
    MissingInitializer {
        /// Donor internal name
        donor: String,
        /// Initializer method name
        name: String,
    },

    /// Advice must be a static `()V` method
    #[error("Advice {0} is not a static ()V method")]
    InvalidAdvice(String),

    /// The target bytes are not a valid type image
    #[error("Target type is malformed: {0}")]
    MalformedTarget(#[source] ImageError),

    /// The transformed type failed verification
    #[error("Transformed type {name} failed verification: {source}")]
    Verify {
        /// Target internal name
        name: String,
        /// Verifier error
        #[source]
        source: VerifyError,
    },

    /// The transformed type could not be assembled
    #[error("Failed to assemble transformed type: {0}")]
    Image(#[from] ImageError),
}

impl From<ResolveError> for WeaveError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(name) => WeaveError::DonorNotFound(name),
            ResolveError::Io { name, source } => WeaveError::DonorUnreadable { name, source },
        }
    }
}

impl From<std::convert::Infallible> for WeaveError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}
