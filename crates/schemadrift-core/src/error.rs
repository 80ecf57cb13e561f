//! Core error types.

use thiserror::Error;

/// Structural problems in a schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A field has an empty name.
    #[error("schema '{schema}' has a field with an empty name")]
    EmptyFieldName {
        /// Schema id.
        schema: String,
    },

    /// Two fields share a name.
    #[error("schema '{schema}' declares field '{field}' more than once")]
    DuplicateField {
        /// Schema id.
        schema: String,
        /// Duplicated field name.
        field: String,
    },
}

/// Errors reported by a [`DataStore`](crate::store::DataStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Collection already exists.
    #[error("collection already exists: {0}")]
    CollectionExists(String),

    /// Document does not exist.
    #[error("document not found: {collection}/{id}")]
    DocumentNotFound {
        /// Collection id.
        collection: String,
        /// Document id.
        id: String,
    },

    /// The store cannot evaluate this kind of filter.
    #[error("filter not supported: {0}")]
    UnsupportedFilter(String),

    /// Invalid filter arguments (e.g. a malformed pattern).
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}
