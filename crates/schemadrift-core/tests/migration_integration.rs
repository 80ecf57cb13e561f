//! Integration tests for the migration engine.

use schemadrift_core::migration::{
    ChangeKind, EngineConfig, ErrorCode, MigrationError, MigrationExecutor, MigrationOptions,
    RenameHint, Severity,
};
use schemadrift_core::schema::{FieldDef, FieldType, Schema};
use schemadrift_core::store::{DataStore, Document, MemoryStore};
use serde_json::json;
use std::num::NonZeroUsize;
use std::sync::Arc;

struct TestContext {
    store: Arc<MemoryStore>,
    executor: MigrationExecutor,
}

impl TestContext {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig::default().with_per_document_ms(10);
        let executor = MigrationExecutor::new(store.clone(), config);
        Self { store, executor }
    }

    fn seed(&self, docs: Vec<Document>) {
        self.store.insert_many("articles", docs);
    }
}

fn articles_v1() -> Schema {
    Schema::new("articles", "articles")
        .with_field(FieldDef::new("title", FieldType::String))
        .with_field(FieldDef::optional("slug", FieldType::String))
        .with_field(FieldDef::optional("rating", FieldType::String))
        .with_field(FieldDef::optional("body", FieldType::String))
}

fn seed_articles(ctx: &TestContext) {
    ctx.seed(vec![
        Document::new("a1")
            .with_field("title", "Rust ownership")
            .with_field("slug", "rust-ownership")
            .with_field("rating", "4")
            .with_field("body", "..."),
        Document::new("a2")
            .with_field("title", "Lifetimes explained in far too many words")
            .with_field("slug", "lifetimes")
            .with_field("rating", "5"),
        Document::new("a3").with_field("title", "Traits").with_field("rating", "3.5"),
    ]);
}

#[test]
fn test_lifecycle_from_new_collection() {
    let ctx = TestContext::new();
    seed_articles(&ctx);

    // First run: nothing stored yet, everything is an addition.
    let first = ctx
        .executor
        .execute_from_store("articles", &articles_v1(), &MigrationOptions::default())
        .unwrap();
    assert!(first.success);
    assert_eq!(ctx.store.current_schema("articles").unwrap(), Some(articles_v1()));

    // Second revision: numeric ratings, short titles, renamed body.
    let v2 = Schema::new("articles", "articles")
        .with_field(FieldDef::new("title", FieldType::String).with_max_length(20))
        .with_field(FieldDef::optional("slug", FieldType::String))
        .with_field(FieldDef::optional("rating", FieldType::Number))
        .with_field(FieldDef::optional("content", FieldType::String));
    let renames = vec![RenameHint::new("body", "content")];

    let preview = ctx
        .executor
        .planner()
        .preview_from_store("articles", &v2, &renames)
        .unwrap();
    let kinds: Vec<_> = preview.changes.iter().map(|c| c.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ChangeKind::ConstraintTightened,
            ChangeKind::TypeChanged,
            ChangeKind::FieldRenamed,
        ]
    );
    assert!(preview.can_auto_migrate);
    assert_eq!(preview.document_count, 3);
    assert_eq!(preview.estimated_duration_ms, 30);
    assert_eq!(preview.changes[0].affected_count, 1);

    let options = MigrationOptions::default()
        .with_backup(true)
        .with_batch_size(NonZeroUsize::new(2).unwrap())
        .with_renames(renames);
    let result = ctx.executor.execute_from_store("articles", &v2, &options).unwrap();
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.processed, 3);
    assert!(result.backup.is_some());

    let a1 = ctx.store.get("articles", "a1").unwrap();
    assert_eq!(a1.get("rating"), Some(&json!(4)));
    assert_eq!(a1.get("content"), Some(&json!("...")));
    assert!(a1.get("body").is_none());

    let a2 = ctx.store.get("articles", "a2").unwrap();
    assert_eq!(a2.get("title"), Some(&json!("Lifetimes explained ")));
    assert_eq!(ctx.store.get("articles", "a3").unwrap().get("rating"), Some(&json!(3.5)));

    // Once applied, the stored schema matches and nothing is left to do.
    let after = ctx.executor.planner().preview_from_store("articles", &v2, &[]).unwrap();
    assert!(!after.requires_migration);
}

#[test]
fn test_duplicate_slugs_block_unique() {
    let ctx = TestContext::new();
    seed_articles(&ctx);
    ctx.seed(vec![Document::new("a4")
        .with_field("title", "Ownership again")
        .with_field("slug", "rust-ownership")]);

    let mut v2 = articles_v1();
    v2.fields[1] = FieldDef::optional("slug", FieldType::String).with_unique();

    let preview = ctx
        .executor
        .planner()
        .preview("articles", &v2, Some(&articles_v1()))
        .unwrap();
    let unique = &preview.changes[0];
    assert_eq!(unique.kind(), ChangeKind::UniqueAdded);
    assert_eq!(unique.affected_count, 2);
    assert!(!unique.migration_possible);
    assert!(!preview.can_auto_migrate);

    let err = ctx
        .executor
        .execute("articles", &v2, Some(&articles_v1()), &MigrationOptions::default())
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MigrationBlocked);
}

#[test]
fn test_unparseable_values_make_type_change_lossy() {
    let ctx = TestContext::new();
    seed_articles(&ctx);
    ctx.seed(vec![Document::new("a5").with_field("title", "Macros").with_field("rating", "great")]);

    let mut v2 = articles_v1();
    v2.fields[2].field_type = FieldType::Number;

    let preview = ctx
        .executor
        .planner()
        .preview("articles", &v2, Some(&articles_v1()))
        .unwrap();
    let change = &preview.changes[0];
    assert_eq!(change.severity, Severity::Blocking);
    assert!(change.data_loss);
    assert!(preview.data_loss_potential);

    let err = ctx
        .executor
        .execute("articles", &v2, Some(&articles_v1()), &MigrationOptions::default())
        .unwrap_err();
    assert!(matches!(err, MigrationError::MigrationBlocked { .. }));
    assert_eq!(ctx.store.get("articles", "a1").unwrap().get("rating"), Some(&json!("4")));
}

#[test]
fn test_preview_serializes_for_callers() {
    let ctx = TestContext::new();
    seed_articles(&ctx);

    let mut v2 = articles_v1();
    v2.fields.pop();
    let preview = ctx
        .executor
        .planner()
        .preview("articles", &v2, Some(&articles_v1()))
        .unwrap();

    let value = serde_json::to_value(&preview).unwrap();
    assert_eq!(value["collectionId"], json!("articles"));
    assert_eq!(value["requiresMigration"], json!(true));
    assert_eq!(value["canAutoMigrate"], json!(false));
    assert_eq!(value["changes"][0]["type"], json!("field_removed"));
    assert_eq!(value["changes"][0]["affectedCount"], json!(1));
}
