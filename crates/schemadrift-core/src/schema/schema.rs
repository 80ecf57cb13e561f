//! Collection schema snapshot.

use super::FieldDef;
use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One collection's full shape at a point in time.
///
/// A schema is either the code-defined target or the persisted current state.
/// Field order only matters for display and for the order changes are reported in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Stable collection identifier.
    pub id: String,
    /// Human label.
    pub name: String,
    /// Field definitions.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Create a schema without fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field to the schema.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check whether a field exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check structural invariants: non-empty, unique field names.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName {
                    schema: self.id.clone(),
                });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.id.clone(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }
}
