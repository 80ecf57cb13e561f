//! Schemadrift Command-Line Client
//!
//! Previews and applies schema migrations against a JSON document set.

mod commands;
mod config;
mod error;
mod formatter;

use clap::{Parser, Subcommand};
use error::CliError;
use formatter::{Formatter, OutputFormat};
use schemadrift_core::migration::{
    DEFAULT_BACKUP_PREFIX, DEFAULT_BATCH_SIZE, DEFAULT_PER_DOCUMENT_MS,
};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Schemadrift Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "schemadrift")]
#[command(version, about = "Detect schema drift and migrate stored documents")]
pub struct Args {
    /// Output format
    #[arg(long, default_value = "table", value_enum, global = true)]
    pub format: OutputFormat,

    /// Estimated milliseconds per document, for duration estimates
    #[arg(
        long,
        env = "SCHEMADRIFT_PER_DOCUMENT_MS",
        default_value_t = DEFAULT_PER_DOCUMENT_MS,
        global = true
    )]
    pub per_document_ms: u64,

    /// Prefix for backup collection names
    #[arg(
        long,
        env = "SCHEMADRIFT_BACKUP_PREFIX",
        default_value = DEFAULT_BACKUP_PREFIX,
        global = true
    )]
    pub backup_prefix: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show what a migration would change, without writing anything
    Preview(InputArgs),
    /// Apply a migration to the document set
    Execute(ExecuteArgs),
}

/// Where the schemas and documents come from.
#[derive(clap::Args, Debug, Clone)]
pub struct InputArgs {
    /// Declared schema (JSON file)
    #[arg(long)]
    pub code: PathBuf,

    /// Stored schema (JSON file); omit when none is stored yet
    #[arg(long)]
    pub current: Option<PathBuf>,

    /// Documents (JSON array file); omit for an empty collection
    #[arg(long)]
    pub documents: Option<PathBuf>,

    /// Collection id; defaults to the declared schema's id
    #[arg(long)]
    pub collection: Option<String>,

    /// Rename hint, repeatable
    #[arg(long = "rename", value_name = "FROM=TO")]
    pub renames: Vec<String>,
}

/// Options for `execute`.
#[derive(clap::Args, Debug, Clone)]
pub struct ExecuteArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Simulate only
    #[arg(long)]
    pub dry_run: bool,

    /// Copy the collection before writing
    #[arg(long)]
    pub backup: bool,

    /// Documents per batch
    #[arg(long, env = "SCHEMADRIFT_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: NonZeroUsize,

    /// Accept changes that destroy stored values
    #[arg(long)]
    pub allow_data_loss: bool,

    /// Accept changes that have no automatic transform
    #[arg(long)]
    pub force: bool,

    /// Write the migrated documents here (JSON array)
    #[arg(long)]
    pub output_documents: Option<PathBuf>,

    /// Write the resulting stored schema here
    #[arg(long)]
    pub output_schema: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schemadrift=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    match run(&args, &*formatter) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}", formatter.format_error(e.code(), &e.to_string()));
            std::process::exit(1);
        }
    }
}

/// Run a subcommand, returning the process exit code.
///
/// Exit code 2 means the migration ran but did not fully succeed.
fn run(args: &Args, formatter: &dyn Formatter) -> Result<i32, CliError> {
    let engine = config::engine_config(args);

    match &args.command {
        Command::Preview(input) => {
            let preview = commands::preview(engine, input)?;
            println!("{}", formatter.format_preview(&preview));
            Ok(0)
        }
        Command::Execute(execute) => {
            let result = commands::execute(engine, execute)?;
            println!("{}", formatter.format_result(&result));
            Ok(if result.success { 0 } else { 2 })
        }
    }
}
