//! Engine configuration from command-line arguments.

use crate::error::CliError;
use crate::{Args, ExecuteArgs};
use schemadrift_core::migration::{EngineConfig, MigrationOptions, RenameHint};
use tracing::info;

/// Build the engine configuration.
pub fn engine_config(args: &Args) -> EngineConfig {
    EngineConfig::default()
        .with_per_document_ms(args.per_document_ms)
        .with_backup_prefix(args.backup_prefix.clone())
}

/// Build the options for one `execute` run.
pub fn migration_options(
    engine: &EngineConfig,
    args: &ExecuteArgs,
    renames: Vec<RenameHint>,
) -> MigrationOptions {
    MigrationOptions::from_config(engine)
        .with_dry_run(args.dry_run)
        .with_backup(args.backup)
        .with_batch_size(args.batch_size)
        .with_allow_data_loss(args.allow_data_loss)
        .with_force(args.force)
        .with_renames(renames)
        .with_progress(|done, total| info!(done, total, "Migration progress"))
}

/// Parse `FROM=TO` rename hints.
pub fn parse_renames(raw: &[String]) -> Result<Vec<RenameHint>, CliError> {
    raw.iter()
        .map(|s| match s.split_once('=') {
            Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
                Ok(RenameHint::new(from.trim(), to.trim()))
            }
            _ => Err(CliError::InvalidRename(s.clone())),
        })
        .collect()
}
