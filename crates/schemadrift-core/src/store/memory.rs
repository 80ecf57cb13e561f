//! In-memory data store.
//!
//! Backs tests and the CLI. Collections are id-ordered maps behind a single
//! `RwLock`, so batch iteration sees a consistent order. A collection that
//! was never written reads as empty.

use super::filter::{duplicate_key, DocumentFilter, FilterMatcher};
use super::{DataStore, Document, DocumentPatch};
use crate::error::StoreError;
use crate::schema::Schema;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Document>>,
    schemas: HashMap<String, Schema>,
}

/// Thread-safe in-memory [`DataStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document.
    pub fn insert(&self, collection: &str, doc: Document) {
        let mut inner = self.inner.write();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id.clone(), doc);
    }

    /// Insert or replace many documents. Returns how many were written.
    pub fn insert_many(&self, collection: &str, docs: impl IntoIterator<Item = Document>) -> usize {
        let mut inner = self.inner.write();
        let target = inner.collections.entry(collection.to_string()).or_default();
        let mut count = 0;
        for doc in docs {
            target.insert(doc.id.clone(), doc);
            count += 1;
        }
        count
    }

    /// Get a document by id.
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner
            .read()
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
    }

    /// All documents of a collection in id order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .read()
            .collections
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    fn count_duplicates(docs: &BTreeMap<String, Document>, field: &str) -> u64 {
        let mut groups: HashMap<String, u64> = HashMap::new();
        for doc in docs.values() {
            if let Some(key) = duplicate_key(doc.get(field)) {
                *groups.entry(key).or_default() += 1;
            }
        }
        groups.values().filter(|&&n| n > 1).sum()
    }
}

impl DataStore for MemoryStore {
    fn current_schema(&self, collection: &str) -> Result<Option<Schema>, StoreError> {
        Ok(self.inner.read().schemas.get(collection).cloned())
    }

    fn save_schema(&self, collection: &str, schema: &Schema) -> Result<(), StoreError> {
        self.inner
            .write()
            .schemas
            .insert(collection.to_string(), schema.clone());
        Ok(())
    }

    fn count_documents(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<u64, StoreError> {
        let inner = self.inner.read();
        let Some(docs) = inner.collections.get(collection) else {
            return Ok(0);
        };

        if let DocumentFilter::Duplicated { field } = filter {
            return Ok(Self::count_duplicates(docs, field));
        }

        let matcher = FilterMatcher::new(filter)?;
        Ok(docs.values().filter(|d| matcher.matches(d)).count() as u64)
    }

    fn fetch_batch(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        use std::ops::Bound;

        let inner = self.inner.read();
        let Some(docs) = inner.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let lower = match after {
            Some(id) => Bound::Excluded(id.to_string()),
            None => Bound::Unbounded,
        };

        Ok(docs
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, d)| d.clone())
            .collect())
    }

    fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: &DocumentPatch,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StoreError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        doc.apply(patch);
        Ok(())
    }

    fn create_backup_collection(&self, source: &str, name: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.write();
        if inner.collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }
        let copy = inner.collections.get(source).cloned().unwrap_or_default();
        let count = copy.len() as u64;
        inner.collections.insert(name.to_string(), copy);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Constraint, FieldDef, FieldType};
    use serde_json::{json, Value};

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_many(
            "posts",
            vec![
                Document::new("1").with_field("slug", "a").with_field("views", 5),
                Document::new("2").with_field("slug", "a").with_field("views", 50),
                Document::new("3").with_field("slug", "b"),
                Document::new("4").with_field("slug", Value::Null),
                Document::new("5").with_field("slug", Value::Null),
            ],
        );
        store
    }

    #[test]
    fn test_count_filters() {
        let store = seeded();
        let count = |f: DocumentFilter| store.count_documents("posts", &f).unwrap();

        assert_eq!(count(DocumentFilter::All), 5);
        assert_eq!(count(DocumentFilter::FieldPresent { field: "views".into() }), 2);
        assert_eq!(count(DocumentFilter::FieldMissing { field: "views".into() }), 3);
        assert_eq!(count(DocumentFilter::FieldMissing { field: "slug".into() }), 2);
        assert_eq!(
            count(DocumentFilter::ConstraintViolated {
                field: "views".into(),
                constraint: Constraint::Max(10.0),
            }),
            1
        );
        assert_eq!(
            count(DocumentFilter::TypeMismatch {
                field: "views".into(),
                expected: FieldType::String,
            }),
            2
        );
    }

    #[test]
    fn test_count_duplicates_ignores_nulls() {
        let store = seeded();
        let n = store
            .count_documents("posts", &DocumentFilter::Duplicated { field: "slug".into() })
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_fetch_batch_cursor() {
        let store = seeded();
        let first = store.fetch_batch("posts", None, 2).unwrap();
        assert_eq!(first.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), ["1", "2"]);
        let next = store.fetch_batch("posts", Some("2"), 10).unwrap();
        assert_eq!(next.len(), 3);
        assert_eq!(next[0].id, "3");
    }

    #[test]
    fn test_update_and_missing_document() {
        let store = seeded();
        let mut patch = DocumentPatch::new();
        patch.set("views", json!(6));
        store.update_document("posts", "1", &patch).unwrap();
        assert_eq!(store.get("posts", "1").unwrap().get("views"), Some(&json!(6)));

        assert!(matches!(
            store.update_document("posts", "99", &patch),
            Err(StoreError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn test_backup_copies_documents() {
        let store = seeded();
        assert_eq!(store.create_backup_collection("posts", "backup_posts_1").unwrap(), 5);
        assert_eq!(store.documents("backup_posts_1").len(), 5);
        assert!(matches!(
            store.create_backup_collection("posts", "backup_posts_1"),
            Err(StoreError::CollectionExists(_))
        ));
    }

    #[test]
    fn test_schema_round_trip() {
        let store = MemoryStore::new();
        assert!(store.current_schema("posts").unwrap().is_none());

        let schema =
            Schema::new("posts", "Posts").with_field(FieldDef::new("title", FieldType::String));
        store.save_schema("posts", &schema).unwrap();
        assert_eq!(store.current_schema("posts").unwrap(), Some(schema));
    }
}
