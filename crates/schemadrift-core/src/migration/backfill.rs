//! Per-document transformation.
//!
//! Turns the ordered change list into a patch for one document. Changes are
//! applied in order to a scratch copy, so a rename followed by a coercion sees
//! the renamed value. Patches are idempotent: rebuilding one for an already
//! migrated document yields an empty patch.

use super::change::{BreakingChange, ChangeDetail, FieldTransform};
use crate::schema::CoercionError;
use crate::store::{Document, DocumentPatch};
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;
use thiserror::Error;

/// Why a document could not be transformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// Stored value did not convert.
    #[error("field '{field}': {source}")]
    Coercion {
        /// Field name.
        field: String,
        /// Conversion failure.
        source: CoercionError,
    },

    /// A newly required field is missing and has no fill value.
    #[error("field '{field}' is required and has no default")]
    NoDefault {
        /// Field name.
        field: String,
    },
}

/// Build the patch that brings `doc` in line with `changes`.
///
/// - transforms are applied when present;
/// - `required_added` without a transform fills the type's zero value;
/// - `field_removed` unsets the field (only reached when forced);
/// - other changes without a transform leave the value alone.
pub fn build_patch(
    doc: &Document,
    changes: &[BreakingChange],
) -> Result<DocumentPatch, TransformError> {
    let mut work = doc.fields.clone();
    let mut touched = BTreeSet::new();

    for change in changes {
        let field = change.field.as_str();

        if let ChangeDetail::FieldRemoved { .. } = change.detail {
            work.remove(field);
            touched.insert(field.to_string());
            continue;
        }

        match &change.transform {
            Some(transform) => {
                apply_transform(&mut work, field, transform, &mut touched)?;
            }
            None => {
                if let ChangeDetail::RequiredAdded { field_type } = &change.detail {
                    if is_missing(&work, field) {
                        let value = field_type.zero_value().ok_or_else(|| {
                            TransformError::NoDefault {
                                field: field.to_string(),
                            }
                        })?;
                        work.insert(field.to_string(), value);
                        touched.insert(field.to_string());
                    }
                }
            }
        }
    }

    let mut patch = DocumentPatch::new();
    for name in touched {
        match (doc.fields.get(&name), work.get(&name)) {
            (old, Some(new)) if old != Some(new) => patch.set(name, new.clone()),
            (Some(_), None) => patch.unset(name),
            _ => {}
        }
    }
    Ok(patch)
}

fn apply_transform(
    work: &mut Map<String, Value>,
    field: &str,
    transform: &FieldTransform,
    touched: &mut BTreeSet<String>,
) -> Result<(), TransformError> {
    match transform {
        FieldTransform::Rename { from } => {
            if let Some(value) = work.remove(from) {
                work.insert(field.to_string(), value);
            }
            touched.insert(from.clone());
        }
        FieldTransform::Coerce { coercion } => {
            if let Some(value) = work.get(field) {
                let converted =
                    coercion
                        .apply_stored(value)
                        .map_err(|source| TransformError::Coercion {
                            field: field.to_string(),
                            source,
                        })?;
                work.insert(field.to_string(), converted);
            }
        }
        FieldTransform::FillDefault { value } => {
            if is_missing(work, field) {
                work.insert(field.to_string(), value.clone());
            }
        }
        FieldTransform::Truncate { max_length } => {
            let limit = usize::try_from(*max_length).unwrap_or(usize::MAX);
            match work.get_mut(field) {
                Some(Value::String(s)) if s.chars().count() > limit => {
                    *s = s.chars().take(limit).collect();
                }
                Some(Value::Array(items)) => items.truncate(limit),
                _ => {}
            }
        }
        FieldTransform::Clamp { min, max } => {
            if let Some(slot) = work.get_mut(field) {
                if let Some(n) = slot.as_f64() {
                    let bound = match (min, max) {
                        (Some(lo), _) if n < *lo => Some(*lo),
                        (_, Some(hi)) if n > *hi => Some(*hi),
                        _ => None,
                    };
                    if let Some(b) = bound {
                        *slot = number_value(b);
                    }
                }
            }
        }
    }
    touched.insert(field.to_string());
    Ok(())
}

fn is_missing(work: &Map<String, Value>, field: &str) -> bool {
    matches!(work.get(field), None | Some(Value::Null))
}

/// Integral bounds stay integers so `5` does not come back as `5.0`.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::diff::{RenameHint, SchemaComparator};
    use crate::schema::{Coercion, FieldDef, FieldType, Schema};
    use serde_json::json;

    fn changes(code: &Schema, db: &Schema) -> Vec<BreakingChange> {
        SchemaComparator::compare(code, db).changes
    }

    #[test]
    fn test_coerce_numeric_string() {
        let db = Schema::new("p", "P").with_field(FieldDef::optional("age", FieldType::String));
        let code = Schema::new("p", "P").with_field(FieldDef::optional("age", FieldType::Number));
        let changes = changes(&code, &db);

        let doc = Document::new("1").with_field("age", "42");
        let patch = build_patch(&doc, &changes).unwrap();
        assert_eq!(patch.set.get("age"), Some(&json!(42)));

        let empty = Document::new("2");
        assert!(build_patch(&empty, &changes).unwrap().is_empty());
    }

    #[test]
    fn test_coerce_failure() {
        let db = Schema::new("p", "P").with_field(FieldDef::optional("age", FieldType::String));
        let code = Schema::new("p", "P").with_field(FieldDef::optional("age", FieldType::Number));

        let doc = Document::new("1").with_field("age", "old");
        let err = build_patch(&doc, &changes(&code, &db)).unwrap_err();
        assert!(matches!(err, TransformError::Coercion { ref field, .. } if field == "age"));
    }

    #[test]
    fn test_required_fill_policy() {
        let db = Schema::new("p", "P")
            .with_field(FieldDef::optional("views", FieldType::Number))
            .with_field(FieldDef::optional("status", FieldType::String));
        let code = Schema::new("p", "P")
            .with_field(FieldDef::new("views", FieldType::Number))
            .with_field(FieldDef::new("status", FieldType::String).with_default("draft"));
        let changes = changes(&code, &db);

        let doc = Document::new("1").with_field("views", Value::Null);
        let patch = build_patch(&doc, &changes).unwrap();
        assert_eq!(patch.set.get("views"), Some(&json!(0)));
        assert_eq!(patch.set.get("status"), Some(&json!("draft")));

        let done = Document::new("2").with_field("views", 3).with_field("status", "live");
        assert!(build_patch(&done, &changes).unwrap().is_empty());
    }

    #[test]
    fn test_required_relation_without_default_fails() {
        let db = Schema::new("p", "P")
            .with_field(FieldDef::optional("author", FieldType::relation("users")));
        let code =
            Schema::new("p", "P").with_field(FieldDef::new("author", FieldType::relation("users")));

        let err = build_patch(&Document::new("1"), &changes(&code, &db)).unwrap_err();
        assert_eq!(err, TransformError::NoDefault { field: "author".into() });
    }

    #[test]
    fn test_rename_then_coerce() {
        let db = Schema::new("p", "P").with_field(FieldDef::optional("count", FieldType::Number));
        let code = Schema::new("p", "P").with_field(FieldDef::optional("total", FieldType::String));
        let changes =
            SchemaComparator::compare_with_renames(&code, &db, &[RenameHint::new("count", "total")])
                .changes;

        let doc = Document::new("1").with_field("count", 7);
        let patch = build_patch(&doc, &changes).unwrap();
        assert_eq!(patch.set.get("total"), Some(&json!("7")));
        assert_eq!(patch.unset, vec!["count".to_string()]);

        let mut migrated = doc.clone();
        migrated.apply(&patch);
        assert!(build_patch(&migrated, &changes).unwrap().is_empty());
    }

    #[test]
    fn test_truncate_and_clamp() {
        let db = Schema::new("p", "P")
            .with_field(FieldDef::optional("title", FieldType::String))
            .with_field(FieldDef::optional("score", FieldType::Number));
        let code = Schema::new("p", "P")
            .with_field(FieldDef::optional("title", FieldType::String).with_max_length(5))
            .with_field(
                FieldDef::optional("score", FieldType::Number).with_range(Some(0.0), Some(10.0)),
            );
        let changes = changes(&code, &db);

        let doc = Document::new("1").with_field("title", "héllo world").with_field("score", 42);
        let patch = build_patch(&doc, &changes).unwrap();
        assert_eq!(patch.set.get("title"), Some(&json!("héllo")));
        assert_eq!(patch.set.get("score"), Some(&json!(10)));

        let low = Document::new("2").with_field("score", -2.5);
        assert_eq!(build_patch(&low, &changes).unwrap().set.get("score"), Some(&json!(0)));

        let ok = Document::new("3").with_field("title", "ok").with_field("score", 3);
        assert!(build_patch(&ok, &changes).unwrap().is_empty());
    }

    #[test]
    fn test_forced_removal_unsets() {
        let db = Schema::new("p", "P")
            .with_field(FieldDef::optional("keep", FieldType::String))
            .with_field(FieldDef::optional("legacy", FieldType::String));
        let code = Schema::new("p", "P").with_field(FieldDef::optional("keep", FieldType::String));

        let doc = Document::new("1").with_field("keep", "a").with_field("legacy", "b");
        let patch = build_patch(&doc, &changes(&code, &db)).unwrap();
        assert_eq!(patch.unset, vec!["legacy".to_string()]);
        assert!(patch.set.is_empty());
    }

    #[test]
    fn test_untransformable_change_leaves_value() {
        let db = Schema::new("p", "P").with_field(FieldDef::optional("flag", FieldType::Boolean));
        let code = Schema::new("p", "P").with_field(FieldDef::optional("flag", FieldType::Date));
        let changes = changes(&code, &db);
        assert!(changes[0].transform.is_none());

        let doc = Document::new("1").with_field("flag", true);
        assert!(build_patch(&doc, &changes).unwrap().is_empty());
    }

    #[test]
    fn test_wrap_in_array_is_idempotent() {
        let db = Schema::new("p", "P").with_field(FieldDef::optional("tag", FieldType::String));
        let code = Schema::new("p", "P")
            .with_field(FieldDef::optional("tag", FieldType::array(FieldType::String)));
        let changes = changes(&code, &db);
        assert_eq!(
            changes[0].transform,
            Some(FieldTransform::Coerce { coercion: Coercion::WrapInArray })
        );

        let doc = Document::new("1").with_field("tag", "rust");
        let patch = build_patch(&doc, &changes).unwrap();
        assert_eq!(patch.set.get("tag"), Some(&json!(["rust"])));

        let already = Document::new("2").with_field("tag", json!(["rust"]));
        assert!(build_patch(&already, &changes).unwrap().is_empty());
    }
}
