use std::path::PathBuf;

use thiserror::Error;

/// Input text does not match the patch grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}: {fragment:?}")]
pub struct ParseError {
    pub message: String,
    /// The offending piece of input.
    pub fragment: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fragment: fragment.into(),
        }
    }
}

/// The content a primitive expects to remove is not what the file holds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply patch to {path}: {message}")]
pub struct ApplyError {
    pub path: String,
    pub message: String,
}

impl ApplyError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Two patches whose combined effect depends on their order.
///
/// This is an expected outcome of commute and merge, not a bug; callers
/// surface it for manual resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("conflict: {message}")]
pub struct CommuteConflict {
    pub message: String,
}

impl CommuteConflict {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Generated primitives failed to reproduce the target file.
///
/// Always an internal invariant violation in the diff or apply code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("patch generation failed: {message}")]
pub struct GenerationError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("path must not be empty")]
    EmptyPath,
    #[error("patch author must not be empty")]
    EmptyAuthor,
    #[error("patch name must not be empty")]
    EmptyName,
    #[error("invalid character in patch {field}: {value:?}")]
    InvalidHeader { field: &'static str, value: String },
    #[error("hunk on {0} must start at line 1 or later")]
    ZeroHunkLine(String),
    #[error("{kind} on {path} neither removes nor adds anything")]
    EmptyEdit { kind: &'static str, path: String },
    #[error("move of {0} onto itself")]
    MoveOntoSelf(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("path escapes the store root: {0}")]
    InvalidPath(String),
}

/// Any failure of a store-backed operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Conflict(#[from] CommuteConflict),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
