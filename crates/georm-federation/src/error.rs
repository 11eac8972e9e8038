//! Federation error types.

use std::time::Duration;

use georm_proto::ErrorKind;
use thiserror::Error;

/// Errors raised by providers and the coordinator.
#[derive(Debug, Error)]
pub enum Error {
    /// Compiler, cache or database failure inside a provider.
    #[error(transparent)]
    Core(#[from] georm_core::Error),

    /// Request or response could not be handled by a remote source.
    #[error("fetch error from {url}: {message}")]
    Fetch { url: String, message: String },

    /// The remote service answered 503.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A remote response body could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A source did not answer within its timeout.
    #[error("source '{source_tag}' timed out after {after:?}")]
    Timeout { source_tag: String, after: Duration },

    /// A provider task panicked or was cancelled.
    #[error("worker error: {0}")]
    Worker(String),
}

impl Error {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Core(e) => e.kind(),
            Error::Fetch { .. }
            | Error::ServiceUnavailable(_)
            | Error::Parse(_)
            | Error::Timeout { .. } => ErrorKind::Environmental,
            Error::Worker(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error is a database failure.
    pub fn is_database(&self) -> bool {
        matches!(self, Error::Core(e) if e.is_database())
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_user(&self) -> bool {
        self.kind() == ErrorKind::User
    }
}

impl From<georm_proto::Error> for Error {
    fn from(e: georm_proto::Error) -> Self {
        Error::Core(e.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Worker(e.to_string())
    }
}
