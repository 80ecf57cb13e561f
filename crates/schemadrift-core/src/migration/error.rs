//! Migration-specific error types.

use crate::error::{SchemaError, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How strongly a change resists automatic application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Can be applied without confirmation.
    Warning,
    /// Needs confirmation or manual intervention.
    Blocking,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Blocking => write!(f, "blocking"),
        }
    }
}

/// Stable machine-readable error codes.
///
/// Read-side codes show up as warnings on a preview, write-side codes as
/// errors from `execute` or entries in a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The current schema could not be loaded; treated as empty.
    SchemaNotFound,
    /// An affected-count query failed or was imprecise.
    EstimateUnavailable,
    /// Execution refused because of unacknowledged risk.
    MigrationBlocked,
    /// Backup creation failed.
    BackupFailed,
    /// A single document could not be transformed or written.
    DocumentTransformFailed,
    /// Caller cancelled between batches.
    Cancelled,
    /// The store failed while reading batches or saving the schema.
    StoreFailure,
    /// The declared schema is malformed; nothing was compared.
    InvalidSchema,
}

impl ErrorCode {
    /// The wire name, e.g. `MIGRATION_BLOCKED`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SchemaNotFound => "SCHEMA_NOT_FOUND",
            ErrorCode::EstimateUnavailable => "ESTIMATE_UNAVAILABLE",
            ErrorCode::MigrationBlocked => "MIGRATION_BLOCKED",
            ErrorCode::BackupFailed => "BACKUP_FAILED",
            ErrorCode::DocumentTransformFailed => "DOCUMENT_TRANSFORM_FAILED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::StoreFailure => "STORE_FAILURE",
            ErrorCode::InvalidSchema => "INVALID_SCHEMA",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which gate refused a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Some change destroys stored values and `allow_data_loss` was not set.
    DataLoss,
    /// Some change has no deterministic transform and `force` was not set.
    NotMigratable,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::DataLoss => write!(f, "data loss requires allow_data_loss"),
            BlockReason::NotMigratable => write!(f, "manual intervention requires force"),
        }
    }
}

/// Errors that stop a migration before any document is written.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A fail-closed gate refused the migration.
    #[error("migration of {collection} blocked: {reason} (fields: {})", fields.join(", "))]
    MigrationBlocked {
        /// Collection id.
        collection: String,
        /// Gate that refused.
        reason: BlockReason,
        /// Fields whose changes tripped the gate.
        fields: Vec<String>,
    },

    /// Backup collection could not be created.
    #[error("backup of {collection} into {backup} failed: {source}")]
    BackupFailed {
        /// Collection id.
        collection: String,
        /// Backup collection name.
        backup: String,
        /// Underlying store error.
        source: StoreError,
    },

    /// The code schema is malformed.
    #[error("invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),
}

impl MigrationError {
    /// Machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            MigrationError::MigrationBlocked { .. } => ErrorCode::MigrationBlocked,
            MigrationError::BackupFailed { .. } => ErrorCode::BackupFailed,
            MigrationError::InvalidSchema(_) => ErrorCode::InvalidSchema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Warning < Severity::Blocking);
        assert_eq!(Severity::Blocking.to_string(), "blocking");
    }

    #[test]
    fn test_error_code_wire_name() {
        let json = serde_json::to_string(&ErrorCode::DocumentTransformFailed).unwrap();
        assert_eq!(json, "\"DOCUMENT_TRANSFORM_FAILED\"");
        assert_eq!(ErrorCode::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn test_error_codes() {
        let blocked = MigrationError::MigrationBlocked {
            collection: "posts".into(),
            reason: BlockReason::DataLoss,
            fields: vec!["body".into(), "slug".into()],
        };
        assert_eq!(blocked.code(), ErrorCode::MigrationBlocked);
        assert!(blocked.to_string().contains("body, slug"));

        let backup = MigrationError::BackupFailed {
            collection: "posts".into(),
            backup: "backup_posts_1".into(),
            source: StoreError::Backend("disk full".into()),
        };
        assert_eq!(backup.code(), ErrorCode::BackupFailed);

        let invalid = MigrationError::from(SchemaError::EmptyFieldName {
            schema: "posts".into(),
        });
        assert_eq!(invalid.code(), ErrorCode::InvalidSchema);
        assert_eq!(invalid.code().as_str(), "INVALID_SCHEMA");
    }
}
