//! Schema drift detection and migration.
//!
//! This module provides:
//! - Schema comparison with a closed coercion table
//! - Impact estimation against live documents
//! - Read-only migration previews
//! - Batched, gated execution with backups and progress reporting
//!
//! # Change classification
//!
//! | Change | Severity | Data loss | Migratable | Transform |
//! |--------|----------|-----------|------------|-----------|
//! | `field_removed` | blocking | yes | no | - |
//! | `field_renamed` | warning | no | yes | rename |
//! | `type_changed` (lossless / conditional) | warning | no | yes | coerce |
//! | `type_changed` (lossy) | blocking | yes | no | - |
//! | `required_added` | warning | no | with a fill value | fill default |
//! | `unique_added` | blocking | no | no | - |
//! | `constraint_tightened` | warning | no | with truncate/clamp | truncate, clamp |
//!
//! The estimator then adjusts these from stored data: a newly required field
//! with missing values becomes blocking, a conditional coercion with values
//! that do not convert becomes lossy, and uniqueness or constraints that no
//! document violates become migratable.
//!
//! # Example
//!
//! ```ignore
//! use schemadrift_core::migration::{EngineConfig, MigrationExecutor, MigrationOptions};
//!
//! let executor = MigrationExecutor::new(store, EngineConfig::default());
//!
//! let preview = executor.planner().preview("posts", &code_schema, Some(&db_schema))?;
//! if preview.can_auto_migrate {
//!     let options = MigrationOptions::default();
//!     let result = executor.execute("posts", &code_schema, Some(&db_schema), &options)?;
//! }
//! ```

pub mod backfill;
pub mod change;
pub mod diff;
pub mod error;
pub mod executor;
pub mod impact;
pub mod plan;
pub mod state;

// Change types
pub use change::{BreakingChange, ChangeDetail, ChangeKind, FieldTransform, UNKNOWN_COUNT};

// Diff types
pub use diff::{Comparison, RenameHint, SchemaComparator};

// Error types
pub use error::{BlockReason, ErrorCode, MigrationError, Severity};

// Impact types
pub use impact::{Estimate, EstimateWarning, ImpactEstimator};

// Plan types
pub use plan::{
    EngineConfig, MigrationPlanner, MigrationPreview, DEFAULT_BACKUP_PREFIX, DEFAULT_BATCH_SIZE,
    DEFAULT_PER_DOCUMENT_MS,
};

// State types
pub use state::ExecutionState;

// Backfill types
pub use backfill::{build_patch, TransformError};

// Executor types
pub use executor::{
    CancelToken, DocumentError, MigrationExecutor, MigrationOptions, MigrationResult,
    ProgressCallback,
};
