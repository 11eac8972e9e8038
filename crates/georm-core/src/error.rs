//! Core error types.

use georm_proto::ErrorKind;
use thiserror::Error;

/// Errors raised by the compiler, materializer, backends and cache.
#[derive(Debug, Error)]
pub enum Error {
    /// The query request is malformed or asks for something unsupported.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Schema metadata is missing or inconsistent.
    #[error("schema error: {0}")]
    Schema(String),

    /// Database failure.
    #[error("database error: {0}")]
    Database(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Proto(#[from] georm_proto::Error),

    /// Broken internal invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_) => ErrorKind::User,
            Error::Schema(_) => ErrorKind::Schema,
            Error::Database(_) => ErrorKind::Environmental,
            Error::Proto(e) => e.kind(),
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error is a database failure.
    pub fn is_database(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::InvalidRequest("x".into()).kind(), ErrorKind::User);
        assert_eq!(Error::Schema("x".into()).kind(), ErrorKind::Schema);
        assert_eq!(Error::Internal("x".into()).kind(), ErrorKind::Internal);

        let db: Error = rusqlite::Error::InvalidQuery.into();
        assert!(db.is_database());
        assert_eq!(db.kind(), ErrorKind::Environmental);

        let proto: Error = georm_proto::Error::InvalidPolygon("ring".into()).into();
        assert_eq!(proto.kind(), ErrorKind::User);
    }
}
