//! Persistence collaborator.
//!
//! The migration engine never talks to a database directly. It reads the
//! persisted schema, counts documents, walks documents in batches, writes
//! patches and creates backups through [`DataStore`].

mod document;
mod filter;
mod memory;

pub use document::{Document, DocumentPatch};
pub use filter::{duplicate_key, DocumentFilter, FilterMatcher};
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::schema::Schema;

/// Abstract document persistence.
///
/// Implementations must be safe to share across threads; the engine holds
/// them behind an `Arc`.
pub trait DataStore: Send + Sync {
    /// Load the persisted schema definition, or `None` for an unknown collection.
    fn current_schema(&self, collection: &str) -> Result<Option<Schema>, StoreError>;

    /// Persist a schema definition as the new current state.
    fn save_schema(&self, collection: &str, schema: &Schema) -> Result<(), StoreError>;

    /// Count documents matching a filter.
    ///
    /// Stores that cannot evaluate a filter return [`StoreError::UnsupportedFilter`].
    fn count_documents(&self, collection: &str, filter: &DocumentFilter)
        -> Result<u64, StoreError>;

    /// Fetch up to `limit` documents with ids strictly greater than `after`,
    /// in ascending id order.
    fn fetch_batch(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Apply a patch to one document.
    fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: &DocumentPatch,
    ) -> Result<(), StoreError>;

    /// Create collection `name` holding a copy of every document in `source`.
    ///
    /// Returns the number of documents copied.
    fn create_backup_collection(&self, source: &str, name: &str) -> Result<u64, StoreError>;
}

/// Iterator over a collection in id-ordered batches.
///
/// Holds at most one batch at a time. Each call to [`iterate_documents`]
/// starts from the beginning; iteration cannot be resumed across calls.
/// A short batch does not end iteration, only an empty one does, since
/// stores may cap their page size below the requested limit.
pub struct DocumentBatches<'a> {
    store: &'a dyn DataStore,
    collection: &'a str,
    batch_size: usize,
    cursor: Option<String>,
    done: bool,
}

/// Walk a collection in batches of `batch_size` documents.
pub fn iterate_documents<'a>(
    store: &'a dyn DataStore,
    collection: &'a str,
    batch_size: std::num::NonZeroUsize,
) -> DocumentBatches<'a> {
    DocumentBatches {
        store,
        collection,
        batch_size: batch_size.get(),
        cursor: None,
        done: false,
    }
}

impl Iterator for DocumentBatches<'_> {
    type Item = Result<Vec<Document>, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self
            .store
            .fetch_batch(self.collection, self.cursor.as_deref(), self.batch_size)
        {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => {
                self.cursor = batch.last().map(|d| d.id.clone());
                Some(Ok(batch))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    /// Returns at most `cap` documents per fetch, whatever the limit.
    struct CappedStore {
        inner: MemoryStore,
        cap: usize,
    }

    impl DataStore for CappedStore {
        fn current_schema(&self, collection: &str) -> Result<Option<Schema>, StoreError> {
            self.inner.current_schema(collection)
        }

        fn save_schema(&self, collection: &str, schema: &Schema) -> Result<(), StoreError> {
            self.inner.save_schema(collection, schema)
        }

        fn count_documents(
            &self,
            collection: &str,
            filter: &DocumentFilter,
        ) -> Result<u64, StoreError> {
            self.inner.count_documents(collection, filter)
        }

        fn fetch_batch(
            &self,
            collection: &str,
            after: Option<&str>,
            limit: usize,
        ) -> Result<Vec<Document>, StoreError> {
            self.inner.fetch_batch(collection, after, limit.min(self.cap))
        }

        fn update_document(
            &self,
            collection: &str,
            id: &str,
            patch: &DocumentPatch,
        ) -> Result<(), StoreError> {
            self.inner.update_document(collection, id, patch)
        }

        fn create_backup_collection(&self, source: &str, name: &str) -> Result<u64, StoreError> {
            self.inner.create_backup_collection(source, name)
        }
    }

    #[test]
    fn test_iterate_in_batches() {
        let store = MemoryStore::new();
        let docs = (0..7).map(|i| Document::new(format!("doc-{i}")));
        store.insert_many("posts", docs);

        let sizes: Vec<usize> = iterate_documents(&store, "posts", NonZeroUsize::new(3).unwrap())
            .map(|b| b.unwrap().len())
            .collect();

        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_iterate_exact_multiple() {
        let store = MemoryStore::new();
        store.insert_many("posts", (0..4).map(|i| Document::new(format!("doc-{i}"))));

        let batches: Vec<_> =
            iterate_documents(&store, "posts", NonZeroUsize::new(2).unwrap()).collect();
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_iterate_with_capped_pages() {
        let store = CappedStore {
            inner: MemoryStore::new(),
            cap: 2,
        };
        store
            .inner
            .insert_many("posts", (0..5).map(|i| Document::new(format!("doc-{i}"))));

        let sizes: Vec<usize> = iterate_documents(&store, "posts", NonZeroUsize::new(3).unwrap())
            .map(|b| b.unwrap().len())
            .collect();

        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_iterate_missing_collection_is_empty() {
        let store = MemoryStore::new();
        let mut batches = iterate_documents(&store, "nope", NonZeroUsize::new(2).unwrap());
        assert!(batches.next().is_none());
    }
}
