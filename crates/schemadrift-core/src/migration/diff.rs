//! Schema comparison.
//!
//! Produces the ordered list of breaking changes between a declared schema
//! and the stored one. Pure and deterministic: no I/O, inputs untouched.

use super::change::{BreakingChange, ChangeDetail, FieldTransform};
use super::error::Severity;
use crate::schema::{Compatibility, Constraint, FieldConstraints, FieldDef, Schema};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Caller-supplied hint that a stored field now lives under a new name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenameHint {
    /// Name in the stored schema.
    pub from: String,
    /// Name in the declared schema.
    pub to: String,
}

impl RenameHint {
    /// Create a hint.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Result of comparing two schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Breaking changes in emission order.
    pub changes: Vec<BreakingChange>,
    /// Whether any change exists.
    pub requires_migration: bool,
    /// Fields only in the declared schema, in declaration order.
    pub added_fields: Vec<String>,
    /// Rename hints that matched and were applied.
    pub renames: Vec<RenameHint>,
}

/// Compares a declared schema against a stored one.
pub struct SchemaComparator;

impl SchemaComparator {
    /// Compare without rename hints.
    pub fn compare(code: &Schema, db: &Schema) -> Comparison {
        Self::compare_with_renames(code, db, &[])
    }

    /// Compare, turning matching remove/add pairs into renames.
    ///
    /// A hint applies only when `from` exists solely in `db` and `to` exists
    /// solely in `code`. Each name takes part in at most one rename.
    ///
    /// Changes follow `code` field order; removed fields come last in `db`
    /// order. Within one field the order is rename, type, required, unique,
    /// then constraints.
    pub fn compare_with_renames(code: &Schema, db: &Schema, hints: &[RenameHint]) -> Comparison {
        let renames = applicable_renames(code, db, hints);
        let renamed_to: HashMap<&str, &str> = renames
            .iter()
            .map(|h| (h.to.as_str(), h.from.as_str()))
            .collect();
        let renamed_from: HashSet<&str> = renames.iter().map(|h| h.from.as_str()).collect();

        let mut comparison = Comparison::default();

        for new in &code.fields {
            if let Some(old) = db.field(&new.name) {
                compare_fields(old, new, &mut comparison.changes);
            } else if let Some(old) = renamed_to.get(new.name.as_str()).and_then(|f| db.field(f)) {
                comparison.changes.push(
                    BreakingChange::new(
                        &new.name,
                        ChangeDetail::FieldRenamed {
                            from: old.name.clone(),
                        },
                        Severity::Warning,
                    )
                    .with_transform(Some(FieldTransform::Rename {
                        from: old.name.clone(),
                    }))
                    .with_description(format!("field '{}' renamed to '{}'", old.name, new.name)),
                );
                compare_fields(old, new, &mut comparison.changes);
            } else {
                comparison.added_fields.push(new.name.clone());
            }
        }

        for old in &db.fields {
            if code.has_field(&old.name) || renamed_from.contains(old.name.as_str()) {
                continue;
            }
            comparison.changes.push(
                BreakingChange::new(
                    &old.name,
                    ChangeDetail::FieldRemoved {
                        previous: old.field_type.clone(),
                    },
                    Severity::Blocking,
                )
                .with_data_loss(true)
                .with_migration_possible(false)
                .with_description(format!(
                    "field '{}' ({}) removed; stored values would be lost",
                    old.name, old.field_type
                )),
            );
        }

        comparison.requires_migration = !comparison.changes.is_empty();
        comparison.renames = renames;

        debug!(
            schema = %code.id,
            changes = comparison.changes.len(),
            added = comparison.added_fields.len(),
            renames = comparison.renames.len(),
            "Compared schemas"
        );

        comparison
    }
}

fn applicable_renames(code: &Schema, db: &Schema, hints: &[RenameHint]) -> Vec<RenameHint> {
    let mut seen_from = HashSet::new();
    let mut seen_to = HashSet::new();
    let mut out = Vec::new();

    for hint in hints {
        let matches = db.has_field(&hint.from)
            && !code.has_field(&hint.from)
            && code.has_field(&hint.to)
            && !db.has_field(&hint.to);
        if !matches || seen_from.contains(&hint.from) || seen_to.contains(&hint.to) {
            continue;
        }
        seen_from.insert(hint.from.clone());
        seen_to.insert(hint.to.clone());
        out.push(hint.clone());
    }

    out
}

fn compare_fields(old: &FieldDef, new: &FieldDef, changes: &mut Vec<BreakingChange>) {
    let name = new.name.as_str();

    match Compatibility::between(&old.field_type, &new.field_type) {
        Compatibility::Identical => {}
        Compatibility::Lossless(coercion) => changes.push(
            BreakingChange::new(name, type_detail(old, new), Severity::Warning)
                .with_description(format!(
                    "type of '{}' changed from {} to {} (lossless: {})",
                    name,
                    old.field_type,
                    new.field_type,
                    coercion.name()
                ))
                .with_transform(Some(FieldTransform::Coerce { coercion })),
        ),
        Compatibility::Conditional(coercion) => changes.push(
            BreakingChange::new(name, type_detail(old, new), Severity::Warning)
                .with_description(format!(
                    "type of '{}' changed from {} to {} (stored values must convert: {})",
                    name,
                    old.field_type,
                    new.field_type,
                    coercion.name()
                ))
                .with_transform(Some(FieldTransform::Coerce { coercion })),
        ),
        Compatibility::Lossy => changes.push(
            BreakingChange::new(name, type_detail(old, new), Severity::Blocking)
                .with_data_loss(true)
                .with_migration_possible(false)
                .with_description(format!(
                    "type of '{}' changed from {} to {} with no lossless conversion",
                    name, old.field_type, new.field_type
                )),
        ),
    }

    if new.required && !old.required {
        let fill = new.default.clone();
        let possible = fill.is_some() || new.field_type.zero_value().is_some();
        let description = match &fill {
            Some(value) => format!("'{}' is now required; missing values get {}", name, value),
            None if possible => format!(
                "'{}' is now required; missing values get the type's zero value",
                name
            ),
            None => format!("'{}' is now required and has no default", name),
        };
        changes.push(
            BreakingChange::new(
                name,
                ChangeDetail::RequiredAdded {
                    field_type: new.field_type.clone(),
                },
                Severity::Warning,
            )
            .with_migration_possible(possible)
            .with_transform(fill.map(|value| FieldTransform::FillDefault { value }))
            .with_description(description),
        );
    }

    if new.unique && !old.unique {
        changes.push(
            BreakingChange::new(name, ChangeDetail::UniqueAdded, Severity::Blocking)
                .with_migration_possible(false)
                .with_description(format!(
                    "'{}' is now unique; duplicates need manual resolution",
                    name
                )),
        );
    }

    for (constraint, transform) in tightened_constraints(&old.constraints, &new.constraints) {
        let description = match &transform {
            Some(t) => format!("'{}' constraint tightened to {} ({})", name, constraint, t),
            None => format!("'{}' constraint tightened to {} (no automatic fix)", name, constraint),
        };
        changes.push(
            BreakingChange::new(
                name,
                ChangeDetail::ConstraintTightened { constraint },
                Severity::Warning,
            )
            .with_migration_possible(transform.is_some())
            .with_transform(transform)
            .with_description(description),
        );
    }
}

fn type_detail(old: &FieldDef, new: &FieldDef) -> ChangeDetail {
    ChangeDetail::TypeChanged {
        from: old.field_type.clone(),
        to: new.field_type.clone(),
    }
}

/// Constraints that became stricter, each with its fixing transform if one exists.
///
/// Introducing a constraint counts as tightening. Any pattern change does too,
/// since pattern containment is not decidable here.
fn tightened_constraints(
    old: &FieldConstraints,
    new: &FieldConstraints,
) -> Vec<(Constraint, Option<FieldTransform>)> {
    let mut out = Vec::new();

    if let Some(n) = new.max_length {
        if old.max_length.map_or(true, |o| n < o) {
            out.push((
                Constraint::MaxLength(n),
                Some(FieldTransform::Truncate { max_length: n }),
            ));
        }
    }

    if let Some(n) = new.min_length {
        if old.min_length.map_or(true, |o| n > o) {
            out.push((Constraint::MinLength(n), None));
        }
    }

    if let Some(n) = new.min {
        if old.min.map_or(true, |o| n > o) {
            out.push((
                Constraint::Min(n),
                Some(FieldTransform::Clamp {
                    min: Some(n),
                    max: None,
                }),
            ));
        }
    }

    if let Some(n) = new.max {
        if old.max.map_or(true, |o| n < o) {
            out.push((
                Constraint::Max(n),
                Some(FieldTransform::Clamp {
                    min: None,
                    max: Some(n),
                }),
            ));
        }
    }

    if let Some(p) = &new.pattern {
        if old.pattern.as_ref() != Some(p) {
            out.push((Constraint::Pattern(p.clone()), None));
        }
    }

    out
}
