//! Output formatters for previews and results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use schemadrift_core::migration::{BreakingChange, MigrationPreview, MigrationResult, UNKNOWN_COUNT};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a migration preview.
    fn format_preview(&self, preview: &MigrationPreview) -> String;

    /// Format a migration result.
    fn format_result(&self, result: &MigrationResult) -> String;

    /// Format an error with its code.
    fn format_error(&self, code: Option<&str>, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_preview(&self, preview: &MigrationPreview) -> String {
        let mut output = String::new();

        let mut summary = Table::new();
        summary.set_header(vec![
            "Collection",
            "Documents",
            "Changes",
            "Auto-migrate",
            "Data loss",
            "Est. time",
        ]);
        summary.add_row(vec![
            Cell::new(&preview.collection_id),
            Cell::new(format_count(preview.document_count)),
            Cell::new(preview.changes.len()),
            Cell::new(yes_no(preview.can_auto_migrate)),
            Cell::new(yes_no(preview.data_loss_potential)),
            Cell::new(format!("{} ms", preview.estimated_duration_ms)),
        ]);
        output.push_str(&summary.to_string());

        if preview.changes.is_empty() {
            output.push_str("\nNo breaking changes");
        } else {
            output.push('\n');
            output.push_str(&changes_table(&preview.changes));
        }

        if !preview.added_fields.is_empty() {
            output.push_str(&format!("\nAdded fields: {}", preview.added_fields.join(", ")));
        }

        for warning in &preview.warnings {
            output.push_str(&format!("\nWarning [{}]: {}", warning.code, warning.message));
        }

        output
    }

    fn format_result(&self, result: &MigrationResult) -> String {
        let mut table = Table::new();
        table.set_header(vec!["State", "Success", "Processed", "Failed", "Duration", "Backup"]);
        table.add_row(vec![
            Cell::new(result.state),
            Cell::new(yes_no(result.success)),
            Cell::new(result.processed),
            Cell::new(result.failed),
            Cell::new(format!("{} ms", result.duration_ms)),
            Cell::new(result.backup.as_deref().unwrap_or("-")),
        ]);

        let mut output = table.to_string();
        if result.dry_run {
            output.push_str("\nDry run: no documents were written");
        }

        if !result.errors.is_empty() {
            let mut errors = Table::new();
            errors.set_header(vec!["Document", "Code", "Error"]);
            for error in &result.errors {
                errors.add_row(vec![
                    Cell::new(error.document_id.as_deref().unwrap_or("-")),
                    Cell::new(error.code),
                    Cell::new(&error.error),
                ]);
            }
            output.push('\n');
            output.push_str(&errors.to_string());
        }

        output
    }

    fn format_error(&self, code: Option<&str>, error: &str) -> String {
        match code {
            Some(code) => format!("Error [{}]: {}", code, error),
            None => format!("Error: {}", error),
        }
    }
}

fn changes_table(changes: &[BreakingChange]) -> String {
    let mut table = Table::new();
    table.set_header(vec![
        "Field",
        "Change",
        "Severity",
        "Data loss",
        "Migratable",
        "Affected",
        "Transform",
    ]);

    for change in changes {
        table.add_row(vec![
            Cell::new(&change.field),
            Cell::new(change.kind()),
            Cell::new(change.severity),
            Cell::new(yes_no(change.data_loss)),
            Cell::new(yes_no(change.migration_possible)),
            Cell::new(format_count(change.affected_count)),
            Cell::new(
                change
                    .transform
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    table.to_string()
}

fn format_count(count: i64) -> String {
    if count == UNKNOWN_COUNT {
        "unknown".to_string()
    } else {
        count.to_string()
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_preview(&self, preview: &MigrationPreview) -> String {
        serde_json::to_string_pretty(preview).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_result(&self, result: &MigrationResult) -> String {
        serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_error(&self, code: Option<&str>, error: &str) -> String {
        serde_json::json!({
            "code": code,
            "error": error
        })
        .to_string()
    }
}
