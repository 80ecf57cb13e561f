//! CLI error types.

use schemadrift_core::migration::{ErrorCode, MigrationError};
use schemadrift_core::error::{SchemaError, StoreError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing a file failed.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file did not contain the expected JSON.
    #[error("{}: invalid JSON: {source}", .path.display())]
    Json {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A schema file is malformed.
    #[error("{}: {source}", .path.display())]
    Schema {
        /// File path.
        path: PathBuf,
        /// Validation failure.
        source: SchemaError,
    },

    /// A `--rename` argument is not `from=to`.
    #[error("invalid rename '{0}', expected FROM=TO")]
    InvalidRename(String),

    /// The in-memory store rejected a write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The engine refused or could not start the migration.
    #[error("{0}")]
    Migration(#[from] MigrationError),
}

impl CliError {
    /// Engine error code, when the engine produced the error.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            CliError::Migration(e) => Some(e.code().as_str()),
            CliError::Store(_) => Some(ErrorCode::StoreFailure.as_str()),
            _ => None,
        }
    }
}
