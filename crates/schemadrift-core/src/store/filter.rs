//! Count filters understood by data stores.

use super::Document;
use crate::error::StoreError;
use crate::schema::{Coercion, Constraint, FieldType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicate selecting documents to count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DocumentFilter {
    /// Every document.
    All,
    /// The field key exists (the value may be null).
    FieldPresent {
        /// Field name.
        field: String,
    },
    /// The field is absent or null.
    FieldMissing {
        /// Field name.
        field: String,
    },
    /// The field holds a non-null value whose runtime type differs from `expected`.
    TypeMismatch {
        /// Field name.
        field: String,
        /// Type the value should have.
        expected: FieldType,
    },
    /// The field is present and `coercion` fails on its value.
    ///
    /// Null only fails `UnwrapOptional`.
    NotCoercible {
        /// Field name.
        field: String,
        /// Coercion to try.
        coercion: Coercion,
    },
    /// The field value violates `constraint`.
    ConstraintViolated {
        /// Field name.
        field: String,
        /// Constraint to check.
        constraint: Constraint,
    },
    /// The field value is shared with at least one other document.
    ///
    /// Null and absent values are never duplicates.
    Duplicated {
        /// Field name.
        field: String,
    },
}

impl DocumentFilter {
    /// Field this filter looks at, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            DocumentFilter::All => None,
            DocumentFilter::FieldPresent { field }
            | DocumentFilter::FieldMissing { field }
            | DocumentFilter::TypeMismatch { field, .. }
            | DocumentFilter::NotCoercible { field, .. }
            | DocumentFilter::ConstraintViolated { field, .. }
            | DocumentFilter::Duplicated { field } => Some(field),
        }
    }

    /// Short operator name, for logs and errors.
    pub fn op(&self) -> &'static str {
        match self {
            DocumentFilter::All => "all",
            DocumentFilter::FieldPresent { .. } => "field_present",
            DocumentFilter::FieldMissing { .. } => "field_missing",
            DocumentFilter::TypeMismatch { .. } => "type_mismatch",
            DocumentFilter::NotCoercible { .. } => "not_coercible",
            DocumentFilter::ConstraintViolated { .. } => "constraint_violated",
            DocumentFilter::Duplicated { .. } => "duplicated",
        }
    }
}

/// Per-document evaluator for filters that do not need to see the whole collection.
///
/// Patterns are compiled once up front.
pub struct FilterMatcher<'a> {
    filter: &'a DocumentFilter,
    pattern: Option<Regex>,
}

impl<'a> FilterMatcher<'a> {
    /// Prepare a filter for evaluation.
    ///
    /// Fails with `UnsupportedFilter` for [`DocumentFilter::Duplicated`], which
    /// cannot be decided one document at a time.
    pub fn new(filter: &'a DocumentFilter) -> Result<Self, StoreError> {
        let pattern = match filter {
            DocumentFilter::Duplicated { .. } => {
                return Err(StoreError::UnsupportedFilter(
                    "duplicated needs a grouping scan".to_string(),
                ))
            }
            DocumentFilter::ConstraintViolated {
                constraint: Constraint::Pattern(p),
                ..
            } => Some(Regex::new(p).map_err(|e| StoreError::InvalidFilter(e.to_string()))?),
            _ => None,
        };
        Ok(Self { filter, pattern })
    }

    /// Check a single document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self.filter {
            DocumentFilter::All => true,
            DocumentFilter::FieldPresent { field } => doc.get(field).is_some(),
            DocumentFilter::FieldMissing { field } => doc.is_missing(field),
            DocumentFilter::TypeMismatch { field, expected } => match doc.get(field) {
                None | Some(Value::Null) => false,
                Some(value) => !expected.matches_value(value),
            },
            DocumentFilter::NotCoercible { field, coercion } => match doc.get(field) {
                None => false,
                Some(value) => coercion.apply_stored(value).is_err(),
            },
            DocumentFilter::ConstraintViolated { field, constraint } => {
                let Some(value) = doc.get(field) else {
                    return false;
                };
                match (&self.pattern, value) {
                    (Some(re), Value::String(s)) => !re.is_match(s),
                    (Some(_), _) => false,
                    (None, _) => constraint.is_violated_by(value).unwrap_or(false),
                }
            }
            DocumentFilter::Duplicated { .. } => false,
        }
    }
}

/// Grouping key for duplicate detection; `None` for values that never collide.
pub fn duplicate_key(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.to_string()),
    }
}
