//! Domain-specific errors.

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::domain::pointer::JsonPointer;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PointerError {
    #[error("pointer '{0}' must be empty or start with '/'")]
    MissingLeadingSlash(String),
    #[error("pointer '{0}' contains an invalid '~' escape")]
    InvalidEscape(String),
    #[error("fragment '{0}' is not valid percent-encoded UTF-8")]
    InvalidEncoding(String),
}

/// Why a single `$ref` could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The target string is not a valid URI reference.
    MalformedRef,
    /// The target file could not be fetched or decoded.
    LoadFailed,
    /// The target file loaded but the pointer does not exist in it.
    PointerNotFound,
}

/// A `$ref` that failed to resolve, attributed to the file and pointer it was written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub source_file: Url,
    /// Pointer to the `$ref` field itself, e.g. `/paths/~1pets/get/$ref`.
    pub source_pointer: JsonPointer,
    /// The raw `$ref` value.
    pub target: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {} at {}",
            self.message, self.source_file, self.source_pointer
        )
    }
}

/// Every resolution failure collected over a complete crawl.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to bundle {root}: {} unresolved reference(s)", .failures.len())]
pub struct BundlingError {
    pub root: Url,
    pub failures: Vec<Failure>,
}

impl BundlingError {
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }
}
