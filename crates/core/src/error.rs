//! Error types for githeight operations.

use thiserror::Error;

/// Result type alias for githeight operations.
pub type Result<T> = std::result::Result<T, GitHeightError>;

/// Main error type for githeight operations.
#[derive(Error, Debug)]
pub enum GitHeightError {
    #[error("No Git repository found at or above path: {0}")]
    NotARepository(String),

    #[error("Object {0} not found in the object database or its alternates")]
    MissingObject(crate::git::ObjectId),

    #[error("Malformed {kind}: {reason}")]
    MalformedObject { kind: &'static str, reason: String },

    #[error("Malformed version descriptor at {reference}: {reason}")]
    MalformedDescriptor { reference: String, reason: String },

    #[error("Version height {height} does not fit in the {position} component (maximum 65534)")]
    HeightOverflow { height: i64, position: &'static str },

    #[error("Descriptor at {0} sets \"inherit\" but no ancestor descriptor exists")]
    InheritanceUnresolved(String),

    #[error("Invalid semantic version: {0}")]
    InvalidSemver(String),

    #[error("Invalid path filter '{spec}': {reason}")]
    InvalidPathFilter { spec: String, reason: String },

    #[error("Invalid ref spec pattern: {0}")]
    InvalidRefSpec(#[from] regex::Error),

    #[error("Unknown committish: {0}")]
    UnknownCommittish(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl GitHeightError {
    /// Shorthand for a malformed-object error with a formatted reason.
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        GitHeightError::MalformedObject {
            kind,
            reason: reason.into(),
        }
    }
}
