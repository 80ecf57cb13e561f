//! Migration planning.
//!
//! Composes comparison and impact estimation into a read-only preview.

use super::change::BreakingChange;
use super::diff::{RenameHint, SchemaComparator};
use super::error::{ErrorCode, MigrationError};
use super::impact::{EstimateWarning, ImpactEstimator};
use crate::schema::Schema;
use crate::store::DataStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Default estimated cost of migrating one document.
pub const DEFAULT_PER_DOCUMENT_MS: u64 = 100;

/// Default number of documents per batch.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => unreachable!(),
};

/// Default prefix for backup collection names.
pub const DEFAULT_BACKUP_PREFIX: &str = "backup";

/// Engine tuning parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Estimated milliseconds per document, for duration estimates.
    pub per_document_ms: u64,
    /// Batch size used when options do not override it.
    pub default_batch_size: NonZeroUsize,
    /// Prefix of suggested backup collection names.
    pub backup_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            per_document_ms: DEFAULT_PER_DOCUMENT_MS,
            default_batch_size: DEFAULT_BATCH_SIZE,
            backup_prefix: DEFAULT_BACKUP_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Set the per-document estimate.
    pub fn with_per_document_ms(mut self, ms: u64) -> Self {
        self.per_document_ms = ms;
        self
    }

    /// Set the default batch size.
    pub fn with_default_batch_size(mut self, size: NonZeroUsize) -> Self {
        self.default_batch_size = size;
        self
    }

    /// Set the backup prefix.
    pub fn with_backup_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.backup_prefix = prefix.into();
        self
    }
}

/// Read-only analysis of what a migration would do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPreview {
    /// Collection id.
    pub collection_id: String,
    /// Annotated changes.
    pub changes: Vec<BreakingChange>,
    /// Whether any change exists.
    pub requires_migration: bool,
    /// Documents in the collection; -1 when unknown.
    pub document_count: i64,
    /// Rough duration estimate.
    pub estimated_duration_ms: u64,
    /// Every change is migratable without data loss and every count is known.
    pub can_auto_migrate: bool,
    /// Some change destroys stored values.
    pub data_loss_potential: bool,
    /// Suggested backup collection name.
    pub backup_collection_name: String,
    /// Fields added by the declared schema.
    pub added_fields: Vec<String>,
    /// Rename hints that were applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub renames: Vec<RenameHint>,
    /// Read-side warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EstimateWarning>,
}

impl MigrationPreview {
    /// Fields whose changes destroy data.
    pub fn data_loss_fields(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.data_loss)
            .map(|c| c.field.clone())
            .collect()
    }

    /// Fields whose changes need manual intervention.
    pub fn unmigratable_fields(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| !c.migration_possible)
            .map(|c| c.field.clone())
            .collect()
    }
}

/// Builds previews. Holds no per-call state.
pub struct MigrationPlanner {
    store: Arc<dyn DataStore>,
    config: EngineConfig,
}

impl MigrationPlanner {
    /// Create a planner.
    pub fn new(store: Arc<dyn DataStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Preview a migration against a given stored schema.
    ///
    /// `None` means the collection has no stored schema yet; every declared
    /// field is then an addition.
    pub fn preview(
        &self,
        collection_id: &str,
        code: &Schema,
        db: Option<&Schema>,
    ) -> Result<MigrationPreview, MigrationError> {
        self.preview_with_renames(collection_id, code, db, &[])
    }

    /// Preview with rename hints.
    #[instrument(skip(self, code, db, renames), fields(schema = %code.id))]
    pub fn preview_with_renames(
        &self,
        collection_id: &str,
        code: &Schema,
        db: Option<&Schema>,
        renames: &[RenameHint],
    ) -> Result<MigrationPreview, MigrationError> {
        let mut warnings = Vec::new();
        if db.is_none() {
            warnings.push(EstimateWarning::new(
                ErrorCode::SchemaNotFound,
                None,
                format!("no stored schema for {}; treating it as empty", collection_id),
            ));
        }
        self.build(collection_id, code, db, renames, warnings)
    }

    /// Preview against the schema the store holds for the collection.
    #[instrument(skip(self, code, renames), fields(schema = %code.id))]
    pub fn preview_from_store(
        &self,
        collection_id: &str,
        code: &Schema,
        renames: &[RenameHint],
    ) -> Result<MigrationPreview, MigrationError> {
        let mut warnings = Vec::new();
        let stored = match self.store.current_schema(collection_id) {
            Ok(Some(schema)) => Some(schema),
            Ok(None) => {
                warnings.push(EstimateWarning::new(
                    ErrorCode::SchemaNotFound,
                    None,
                    format!("no stored schema for {}; treating it as empty", collection_id),
                ));
                None
            }
            Err(e) => {
                warn!(collection_id, error = %e, "Failed to load stored schema");
                warnings.push(EstimateWarning::new(
                    ErrorCode::SchemaNotFound,
                    None,
                    format!("stored schema unavailable: {}; treating it as empty", e),
                ));
                None
            }
        };
        self.build(collection_id, code, stored.as_ref(), renames, warnings)
    }

    /// Suggested backup collection name for a schema, stamped with the current time.
    pub fn backup_name(&self, code: &Schema) -> String {
        format!(
            "{}_{}_{}",
            self.config.backup_prefix,
            code.name,
            Utc::now().timestamp_millis()
        )
    }

    fn build(
        &self,
        collection_id: &str,
        code: &Schema,
        db: Option<&Schema>,
        renames: &[RenameHint],
        mut warnings: Vec<EstimateWarning>,
    ) -> Result<MigrationPreview, MigrationError> {
        code.validate()?;

        let empty;
        let db = match db {
            Some(schema) => schema,
            None => {
                empty = Schema::new(collection_id, code.name.clone());
                &empty
            }
        };

        let comparison = SchemaComparator::compare_with_renames(code, db, renames);
        let estimate =
            ImpactEstimator::new(self.store.as_ref()).estimate(collection_id, comparison.changes);

        let can_auto_migrate = estimate.can_auto_migrate();
        let data_loss_potential = estimate.data_loss_potential();
        warnings.extend(estimate.warnings);

        let preview = MigrationPreview {
            collection_id: collection_id.to_string(),
            requires_migration: !estimate.changes.is_empty(),
            changes: estimate.changes,
            document_count: estimate.document_count,
            estimated_duration_ms: (estimate.document_count.max(0) as u64)
                .saturating_mul(self.config.per_document_ms),
            can_auto_migrate,
            data_loss_potential,
            backup_collection_name: self.backup_name(code),
            added_fields: comparison.added_fields,
            renames: comparison.renames,
            warnings,
        };

        info!(
            collection_id,
            changes = preview.changes.len(),
            document_count = preview.document_count,
            can_auto_migrate = preview.can_auto_migrate,
            data_loss = preview.data_loss_potential,
            "Migration preview ready"
        );

        Ok(preview)
    }
}
