//! Protocol error types.

use thiserror::Error;

/// Broad classification shared by every georm error type.
///
/// The federation coordinator and the CLI decide how to react to a failure
/// from its kind alone, never from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller supplied something malformed or unsupported.
    User,
    /// Schema metadata is inconsistent with what the query needs.
    Schema,
    /// Database, network or other runtime environment failure.
    Environmental,
    /// Broken internal invariant.
    Internal,
}

impl ErrorKind {
    /// Short lowercase label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::User => "user",
            ErrorKind::Schema => "schema",
            ErrorKind::Environmental => "environmental",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A value could not be converted to the requested kind.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A polygon descriptor is malformed.
    #[error("invalid polygon: {0}")]
    InvalidPolygon(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Every protocol error originates from caller-supplied input.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::User
    }
}
