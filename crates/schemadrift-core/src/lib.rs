//! Schemadrift Core - schema drift detection and document migration.
//!
//! Compares the schema a collection is declared with in code against the
//! schema last persisted for it, estimates how many stored documents each
//! difference affects, and applies the change in batches through a
//! [`DataStore`].

pub mod error;
pub mod migration;
pub mod schema;
pub mod store;

pub use error::{SchemaError, StoreError};
pub use migration::{
    BreakingChange, CancelToken, ChangeKind, Comparison, EngineConfig, ErrorCode, Estimate,
    ExecutionState, FieldTransform, ImpactEstimator, MigrationError, MigrationExecutor,
    MigrationOptions, MigrationPlanner, MigrationPreview, MigrationResult, RenameHint,
    SchemaComparator, Severity,
};
pub use schema::{
    Coercion, Compatibility, Constraint, FieldConstraints, FieldDef, FieldType, Schema,
};
pub use store::{DataStore, Document, DocumentFilter, DocumentPatch, MemoryStore};
