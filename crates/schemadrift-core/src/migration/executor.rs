//! Migration executor - applies a previewed migration.
//!
//! Runs validate, backup, and batched apply. Gates are checked before the
//! first write. Per-document failures are recorded and skipped. Documents
//! already written are never rolled back; the backup collection is the
//! recovery path.

use super::backfill::build_patch;
use super::diff::RenameHint;
use super::error::{BlockReason, ErrorCode, MigrationError};
use super::plan::{EngineConfig, MigrationPlanner, MigrationPreview};
use super::state::ExecutionState;
use crate::schema::Schema;
use crate::store::{iterate_documents, DataStore};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Progress callback: `(documents handled so far, document count)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Cooperative cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one `execute` call.
#[derive(Clone)]
pub struct MigrationOptions {
    /// Simulate only; never write.
    pub dry_run: bool,
    /// Copy the collection before writing.
    pub create_backup: bool,
    /// Documents per batch.
    pub batch_size: NonZeroUsize,
    /// Accept changes that destroy stored values.
    pub allow_data_loss: bool,
    /// Accept changes without a deterministic transform.
    pub force: bool,
    /// Called after every batch.
    pub on_progress: Option<ProgressCallback>,
    /// Checked before every batch.
    pub cancel: Option<CancelToken>,
    /// Rename hints, passed through to the comparison.
    pub renames: Vec<RenameHint>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            create_backup: false,
            batch_size: super::plan::DEFAULT_BATCH_SIZE,
            allow_data_loss: false,
            force: false,
            on_progress: None,
            cancel: None,
            renames: Vec::new(),
        }
    }
}

impl std::fmt::Debug for MigrationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationOptions")
            .field("dry_run", &self.dry_run)
            .field("create_backup", &self.create_backup)
            .field("batch_size", &self.batch_size)
            .field("allow_data_loss", &self.allow_data_loss)
            .field("force", &self.force)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancel", &self.cancel)
            .field("renames", &self.renames)
            .finish()
    }
}

impl MigrationOptions {
    /// Options using the engine's default batch size.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            batch_size: config.default_batch_size,
            ..Self::default()
        }
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable or disable backups.
    pub fn with_backup(mut self, create_backup: bool) -> Self {
        self.create_backup = create_backup;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Accept data loss.
    pub fn with_allow_data_loss(mut self, allow: bool) -> Self {
        self.allow_data_loss = allow;
        self
    }

    /// Accept changes that need manual intervention.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set the progress callback.
    pub fn with_progress(mut self, callback: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set rename hints.
    pub fn with_renames(mut self, renames: Vec<RenameHint>) -> Self {
        self.renames = renames;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// A failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentError {
    /// Document id; absent for run-level entries such as cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Error code.
    pub code: ErrorCode,
    /// Details.
    pub error: String,
}

impl DocumentError {
    fn document(id: &str, error: impl ToString) -> Self {
        Self {
            document_id: Some(id.to_string()),
            code: ErrorCode::DocumentTransformFailed,
            error: error.to_string(),
        }
    }

    fn run(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            document_id: None,
            code,
            error: error.into(),
        }
    }
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// Every document migrated and the schema was saved.
    pub success: bool,
    /// Documents migrated (or already compliant).
    pub processed: u64,
    /// Documents that failed.
    pub failed: u64,
    /// Recorded failures.
    pub errors: Vec<DocumentError>,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Backup collection, if one was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    /// Final state.
    pub state: ExecutionState,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl MigrationResult {
    /// Whether the run stopped on a cancellation request.
    pub fn was_cancelled(&self) -> bool {
        self.errors.iter().any(|e| e.code == ErrorCode::Cancelled)
    }

    /// Ids of documents that failed, for a targeted retry.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter_map(|e| e.document_id.as_deref())
            .collect()
    }
}

/// Tracks state transitions of one run.
struct Run {
    state: ExecutionState,
    started: Instant,
}

impl Run {
    fn start() -> Self {
        Self {
            state: ExecutionState::Idle,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: ExecutionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Migration state change");
        self.state = next;
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Applies migrations. Holds no per-call state, so one instance can serve
/// many callers; runs against the same collection must not overlap.
pub struct MigrationExecutor {
    planner: MigrationPlanner,
}

impl MigrationExecutor {
    /// Create an executor.
    pub fn new(store: Arc<dyn DataStore>, config: EngineConfig) -> Self {
        Self {
            planner: MigrationPlanner::new(store, config),
        }
    }

    /// Create an executor sharing an existing planner's store and config.
    pub fn from_planner(planner: MigrationPlanner) -> Self {
        Self { planner }
    }

    /// The planner used for validation.
    pub fn planner(&self) -> &MigrationPlanner {
        &self.planner
    }

    /// Migrate `collection_id` from `db` (or an empty schema) to `code`.
    #[instrument(
        skip(self, code, db, options),
        fields(schema = %code.id, dry_run = options.dry_run)
    )]
    pub fn execute(
        &self,
        collection_id: &str,
        code: &Schema,
        db: Option<&Schema>,
        options: &MigrationOptions,
    ) -> Result<MigrationResult, MigrationError> {
        let mut run = Run::start();
        run.advance(ExecutionState::Validating);
        let preview = self
            .planner
            .preview_with_renames(collection_id, code, db, &options.renames)?;
        self.run(run, collection_id, code, &preview, options)
    }

    /// Migrate against the schema the store currently holds.
    #[instrument(skip(self, code, options), fields(schema = %code.id, dry_run = options.dry_run))]
    pub fn execute_from_store(
        &self,
        collection_id: &str,
        code: &Schema,
        options: &MigrationOptions,
    ) -> Result<MigrationResult, MigrationError> {
        let mut run = Run::start();
        run.advance(ExecutionState::Validating);
        let preview = self
            .planner
            .preview_from_store(collection_id, code, &options.renames)?;
        self.run(run, collection_id, code, &preview, options)
    }

    fn run(
        &self,
        mut run: Run,
        collection_id: &str,
        code: &Schema,
        preview: &MigrationPreview,
        options: &MigrationOptions,
    ) -> Result<MigrationResult, MigrationError> {
        let store = self.planner.store().as_ref();
        let mut result = MigrationResult {
            success: true,
            processed: 0,
            failed: 0,
            errors: Vec::new(),
            duration_ms: 0,
            backup: None,
            state: ExecutionState::Validating,
            dry_run: options.dry_run,
        };

        if preview.changes.is_empty() {
            // Additive changes still need to be recorded as the new stored schema.
            if !options.dry_run {
                if let Err(e) = store.save_schema(collection_id, code) {
                    warn!(collection_id, error = %e, "Failed to save schema");
                    result.success = false;
                    result.errors.push(DocumentError::run(
                        ErrorCode::StoreFailure,
                        format!("save schema: {}", e),
                    ));
                }
            }
            run.advance(ExecutionState::Completed);
            return Ok(finish(result, &run));
        }

        if options.dry_run {
            info!(collection_id, changes = preview.changes.len(), "Dry run, nothing written");
            run.advance(ExecutionState::Completed);
            return Ok(finish(result, &run));
        }

        let loss = preview.data_loss_fields();
        if !loss.is_empty() && !options.allow_data_loss {
            run.advance(ExecutionState::Rejected);
            warn!(collection_id, fields = ?loss, "Migration blocked: data loss");
            return Err(MigrationError::MigrationBlocked {
                collection: collection_id.to_string(),
                reason: BlockReason::DataLoss,
                fields: loss,
            });
        }

        let stuck = preview.unmigratable_fields();
        if !stuck.is_empty() && !options.force {
            run.advance(ExecutionState::Rejected);
            warn!(collection_id, fields = ?stuck, "Migration blocked: manual intervention needed");
            return Err(MigrationError::MigrationBlocked {
                collection: collection_id.to_string(),
                reason: BlockReason::NotMigratable,
                fields: stuck,
            });
        }

        if options.create_backup {
            run.advance(ExecutionState::BackingUp);
            let backup = preview.backup_collection_name.clone();
            match store.create_backup_collection(collection_id, &backup) {
                Ok(copied) => {
                    info!(collection_id, backup = %backup, copied, "Backup created");
                    result.backup = Some(backup);
                }
                Err(source) => {
                    run.advance(ExecutionState::Failed);
                    warn!(collection_id, backup = %backup, error = %source, "Backup failed");
                    return Err(MigrationError::BackupFailed {
                        collection: collection_id.to_string(),
                        backup,
                        source,
                    });
                }
            }
        }

        run.advance(ExecutionState::Applying);
        let total = preview.document_count.max(0) as u64;
        let mut cancelled = false;
        let mut store_failed = false;

        let mut batches = iterate_documents(store, collection_id, options.batch_size);
        loop {
            if options.is_cancelled() {
                info!(collection_id, processed = result.processed, "Migration cancelled");
                result
                    .errors
                    .push(DocumentError::run(ErrorCode::Cancelled, "cancelled between batches"));
                cancelled = true;
                break;
            }

            let batch = match batches.next() {
                None => break,
                Some(Ok(batch)) => batch,
                Some(Err(e)) => {
                    warn!(collection_id, error = %e, "Failed to fetch batch");
                    result.errors.push(DocumentError::run(
                        ErrorCode::StoreFailure,
                        format!("fetch batch: {}", e),
                    ));
                    store_failed = true;
                    break;
                }
            };

            for doc in &batch {
                let outcome = build_patch(doc, &preview.changes)
                    .map_err(|e| e.to_string())
                    .and_then(|patch| {
                        if patch.is_empty() {
                            Ok(())
                        } else {
                            store
                                .update_document(collection_id, &doc.id, &patch)
                                .map_err(|e| e.to_string())
                        }
                    });

                match outcome {
                    Ok(()) => result.processed += 1,
                    Err(e) => {
                        debug!(collection_id, document_id = %doc.id, error = %e, "Document failed");
                        result.failed += 1;
                        result.errors.push(DocumentError::document(&doc.id, e));
                    }
                }
            }

            if let Some(callback) = &options.on_progress {
                callback(result.processed + result.failed, total);
            }
            debug!(
                collection_id,
                batch = batch.len(),
                processed = result.processed,
                failed = result.failed,
                "Batch applied"
            );
        }

        if store_failed {
            run.advance(ExecutionState::Failed);
            result.success = false;
            return Ok(finish(result, &run));
        }

        run.advance(ExecutionState::Completed);
        result.success = result.failed == 0 && !cancelled;

        if result.success {
            if let Err(e) = store.save_schema(collection_id, code) {
                warn!(collection_id, error = %e, "Failed to save schema");
                result.success = false;
                result.errors.push(DocumentError::run(
                    ErrorCode::StoreFailure,
                    format!("save schema: {}", e),
                ));
            }
        }

        Ok(finish(result, &run))
    }
}

fn finish(mut result: MigrationResult, run: &Run) -> MigrationResult {
    result.state = run.state;
    result.duration_ms = run.elapsed_ms();
    info!(
        state = %result.state,
        success = result.success,
        processed = result.processed,
        failed = result.failed,
        duration_ms = result.duration_ms,
        "Migration finished"
    );
    result
}
