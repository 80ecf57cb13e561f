//! Command implementations.
//!
//! Inputs are JSON files loaded into a [`MemoryStore`]; the engine then runs
//! against that store exactly as it would against a database.

use crate::config;
use crate::error::CliError;
use crate::{ExecuteArgs, InputArgs};
use schemadrift_core::migration::{
    EngineConfig, MigrationExecutor, MigrationPlanner, MigrationPreview, MigrationResult,
    RenameHint,
};
use schemadrift_core::schema::Schema;
use schemadrift_core::store::{DataStore, Document, MemoryStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded inputs for one command.
struct Workspace {
    store: Arc<MemoryStore>,
    collection: String,
    code: Schema,
    renames: Vec<RenameHint>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let raw = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_schema(path: &Path) -> Result<Schema, CliError> {
    let schema: Schema = read_json(path)?;
    schema.validate().map_err(|source| CliError::Schema {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(schema)
}

fn load(input: &InputArgs) -> Result<Workspace, CliError> {
    let code = read_schema(&input.code)?;
    let collection = input.collection.clone().unwrap_or_else(|| code.id.clone());
    let renames = config::parse_renames(&input.renames)?;

    let store = Arc::new(MemoryStore::new());

    if let Some(path) = &input.current {
        let current = read_schema(path)?;
        store.save_schema(&collection, &current)?;
    }

    if let Some(path) = &input.documents {
        let docs: Vec<Document> = read_json(path)?;
        let count = store.insert_many(&collection, docs);
        debug!(collection = %collection, count, "Loaded documents");
    }

    Ok(Workspace {
        store,
        collection,
        code,
        renames,
    })
}

/// Preview the migration described by `input`.
pub fn preview(engine: EngineConfig, input: &InputArgs) -> Result<MigrationPreview, CliError> {
    let ws = load(input)?;
    let planner = MigrationPlanner::new(ws.store.clone(), engine);
    Ok(planner.preview_from_store(&ws.collection, &ws.code, &ws.renames)?)
}

/// Execute the migration described by `args` and write requested outputs.
pub fn execute(engine: EngineConfig, args: &ExecuteArgs) -> Result<MigrationResult, CliError> {
    let ws = load(&args.input)?;
    let options = config::migration_options(&engine, args, ws.renames.clone());
    let executor = MigrationExecutor::new(ws.store.clone(), engine);

    let result = executor.execute_from_store(&ws.collection, &ws.code, &options)?;
    info!(
        collection = %ws.collection,
        processed = result.processed,
        failed = result.failed,
        success = result.success,
        "Migration finished"
    );

    if let Some(path) = &args.output_documents {
        write_json(path, &ws.store.documents(&ws.collection))?;
    }
    if let Some(path) = &args.output_schema {
        if let Ok(Some(schema)) = ws.store.current_schema(&ws.collection) {
            write_json(path, &schema)?;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Args, Command};
    use clap::Parser;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn write(&self, name: &str, value: serde_json::Value) -> String {
            let path = self.dir.path().join(name);
            fs::write(&path, value.to_string()).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_string_lossy().into_owned()
        }
    }

    fn schema_v1() -> serde_json::Value {
        json!({
            "id": "users",
            "name": "users",
            "fields": [
                {"name": "email", "type": {"kind": "string"}, "required": true},
                {"name": "age", "type": {"kind": "string"}},
                {"name": "nickname", "type": {"kind": "string"}}
            ]
        })
    }

    fn schema_v2() -> serde_json::Value {
        json!({
            "id": "users",
            "name": "users",
            "fields": [
                {"name": "email", "type": {"kind": "string"}, "required": true},
                {"name": "age", "type": {"kind": "number"}},
                {"name": "handle", "type": {"kind": "string"}}
            ]
        })
    }

    fn documents() -> serde_json::Value {
        json!([
            {"_id": "u1", "email": "a@example.com", "age": "31", "nickname": "ace"},
            {"_id": "u2", "email": "b@example.com", "age": "27"}
        ])
    }

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["schemadrift"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_preview_reports_changes() {
        let fx = Fixture::new();
        let code = fx.write("v2.json", schema_v2());
        let current = fx.write("v1.json", schema_v1());
        let docs = fx.write("docs.json", documents());

        let args = parse(&[
            "preview", "--code", &code, "--current", &current, "--documents", &docs,
            "--rename", "nickname=handle",
        ]);
        let Command::Preview(input) = &args.command else {
            panic!("expected preview");
        };

        let preview = preview(config::engine_config(&args), input).unwrap();
        assert_eq!(preview.collection_id, "users");
        assert_eq!(preview.document_count, 2);
        assert_eq!(preview.changes.len(), 2);
        assert!(preview.can_auto_migrate);
    }

    #[test]
    fn test_execute_writes_outputs() {
        let fx = Fixture::new();
        let code = fx.write("v2.json", schema_v2());
        let current = fx.write("v1.json", schema_v1());
        let docs = fx.write("docs.json", documents());
        let out_docs = fx.path("out.json");
        let out_schema = fx.path("schema.json");

        let args = parse(&[
            "execute", "--code", &code, "--current", &current, "--documents", &docs,
            "--rename", "nickname=handle", "--output-documents", &out_docs,
            "--output-schema", &out_schema,
        ]);
        let Command::Execute(execute_args) = &args.command else {
            panic!("expected execute");
        };

        let result = execute(config::engine_config(&args), execute_args).unwrap();
        assert!(result.success);
        assert_eq!(result.processed, 2);

        let written: Vec<Document> = read_json(Path::new(&out_docs)).unwrap();
        assert_eq!(written[0].get("age"), Some(&json!(31)));
        assert_eq!(written[0].get("handle"), Some(&json!("ace")));
        assert!(written[0].get("nickname").is_none());

        let schema: Schema = read_json(Path::new(&out_schema)).unwrap();
        assert!(schema.has_field("handle"));
    }

    #[test]
    fn test_execute_blocked_without_force() {
        let fx = Fixture::new();
        let code = fx.write("v2.json", schema_v2());
        let current = fx.write("v1.json", schema_v1());
        let docs = fx.write("docs.json", documents());

        // Without the rename hint, nickname is removed and loses data.
        let args = parse(&[
            "execute", "--code", &code, "--current", &current, "--documents", &docs,
        ]);
        let Command::Execute(execute_args) = &args.command else {
            panic!("expected execute");
        };

        let err = execute(config::engine_config(&args), execute_args).unwrap_err();
        assert_eq!(err.code(), Some("MIGRATION_BLOCKED"));
    }

    #[test]
    fn test_invalid_schema_file() {
        let fx = Fixture::new();
        let code = fx.write("bad.json", json!({"id": "users"}));

        let args = parse(&["preview", "--code", &code]);
        let Command::Preview(input) = &args.command else {
            panic!("expected preview");
        };

        assert!(matches!(
            preview(config::engine_config(&args), input),
            Err(CliError::Json { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let args = parse(&["preview", "--code", "/nonexistent/schema.json"]);
        let Command::Preview(input) = &args.command else {
            panic!("expected preview");
        };

        assert!(matches!(
            preview(config::engine_config(&args), input),
            Err(CliError::Io { .. })
        ));
    }
}
