//! Field definitions for collection schemas.

use super::types::FieldType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A field definition within a collection schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Database field name. Join key between schema versions.
    pub name: String,
    /// Field data type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether every document must carry a non-null value.
    #[serde(default)]
    pub required: bool,
    /// Whether values must be unique across the collection.
    #[serde(default)]
    pub unique: bool,
    /// Type-specific constraints.
    #[serde(default, skip_serializing_if = "FieldConstraints::is_empty")]
    pub constraints: FieldConstraints,
    /// Value used to fill documents when the field becomes required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            unique: false,
            constraints: FieldConstraints::default(),
            default: None,
        }
    }

    /// Create an optional field (required = false).
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::new(name, field_type)
        }
    }

    /// Mark the field as unique.
    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Replace all constraints.
    pub fn with_constraints(mut self, constraints: FieldConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Set the maximum length.
    pub fn with_max_length(mut self, max_length: u64) -> Self {
        self.constraints.max_length = Some(max_length);
        self
    }

    /// Set the minimum length.
    pub fn with_min_length(mut self, min_length: u64) -> Self {
        self.constraints.min_length = Some(min_length);
        self
    }

    /// Set the numeric range.
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraints.min = min;
        self.constraints.max = max;
        self
    }

    /// Set the pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.constraints.pattern = Some(pattern.into());
        self
    }

    /// Check if this field has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Optional per-field constraints.
///
/// Length limits apply to strings (in characters) and arrays (in elements).
/// Numeric bounds apply to numbers. Patterns apply to strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConstraints {
    /// Minimum length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Maximum length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Inclusive lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Regular expression every string value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl FieldConstraints {
    /// Check if no constraint is set.
    pub fn is_empty(&self) -> bool {
        self.min_length.is_none()
            && self.max_length.is_none()
            && self.min.is_none()
            && self.max.is_none()
            && self.pattern.is_none()
    }
}

/// A single constraint, as carried by a tightening change or a count filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "constraint", content = "value", rename_all = "camelCase")]
pub enum Constraint {
    /// Minimum length.
    MinLength(u64),
    /// Maximum length.
    MaxLength(u64),
    /// Inclusive lower bound.
    Min(f64),
    /// Inclusive upper bound.
    Max(f64),
    /// Regular expression.
    Pattern(String),
}

impl Constraint {
    /// Check a value against a non-pattern constraint.
    ///
    /// Returns `None` for patterns, which need a compiled expression.
    /// Null values and values of an unrelated shape never violate.
    pub fn is_violated_by(&self, value: &Value) -> Option<bool> {
        let violated = match self {
            Constraint::MinLength(min) => value_len(value).is_some_and(|len| len < *min),
            Constraint::MaxLength(max) => value_len(value).is_some_and(|len| len > *max),
            Constraint::Min(min) => value.as_f64().is_some_and(|n| n < *min),
            Constraint::Max(max) => value.as_f64().is_some_and(|n| n > *max),
            Constraint::Pattern(_) => return None,
        };
        Some(violated)
    }
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::MinLength(n) => write!(f, "minLength={}", n),
            Constraint::MaxLength(n) => write!(f, "maxLength={}", n),
            Constraint::Min(n) => write!(f, "min={}", n),
            Constraint::Max(n) => write!(f, "max={}", n),
            Constraint::Pattern(p) => write!(f, "pattern=/{}/", p),
        }
    }
}

fn value_len(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => Some(s.chars().count() as u64),
        Value::Array(items) => Some(items.len() as u64),
        _ => None,
    }
}
