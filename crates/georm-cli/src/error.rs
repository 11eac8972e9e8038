//! CLI error types.

use std::path::PathBuf;

use georm_proto::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] georm_core::Error),

    #[error(transparent)]
    Federation(#[from] georm_federation::Error),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::Core(e) => e.kind(),
            CliError::Federation(e) => e.kind(),
            CliError::Io { .. } => ErrorKind::Environmental,
            CliError::Json { .. } => ErrorKind::User,
        }
    }
}
