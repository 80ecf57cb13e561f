//! Documents and partial updates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Field values.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Set a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value. Absent and null are different.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Check whether a field is absent or null.
    pub fn is_missing(&self, name: &str) -> bool {
        matches!(self.fields.get(name), None | Some(Value::Null))
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &DocumentPatch) {
        for name in &patch.unset {
            self.fields.remove(name);
        }
        for (name, value) in &patch.set {
            self.fields.insert(name.clone(), value.clone());
        }
    }
}

/// Partial update of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentPatch {
    /// Fields to write.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub set: Map<String, Value>,
    /// Fields to remove.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<String>,
}

impl DocumentPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a field.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.unset.retain(|n| *n != name);
        self.set.insert(name, value);
    }

    /// Remove a field.
    pub fn unset(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.set.remove(&name);
        if !self.unset.contains(&name) {
            self.unset.push(name);
        }
    }

    /// Check whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}
