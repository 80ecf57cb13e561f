//! Classified schema changes.

use super::error::Severity;
use crate::schema::{Coercion, Constraint, FieldType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel affected count for "the estimate could not be computed".
pub const UNKNOWN_COUNT: i64 = -1;

/// Kind of breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Field exists only in the stored schema.
    FieldRemoved,
    /// Field moved to a new name through a rename hint.
    FieldRenamed,
    /// Field type differs.
    TypeChanged,
    /// Field became required.
    RequiredAdded,
    /// Field became unique.
    UniqueAdded,
    /// A constraint became stricter.
    ConstraintTightened,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::FieldRemoved => write!(f, "field_removed"),
            ChangeKind::FieldRenamed => write!(f, "field_renamed"),
            ChangeKind::TypeChanged => write!(f, "type_changed"),
            ChangeKind::RequiredAdded => write!(f, "required_added"),
            ChangeKind::UniqueAdded => write!(f, "unique_added"),
            ChangeKind::ConstraintTightened => write!(f, "constraint_tightened"),
        }
    }
}

/// Kind-specific payload of a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeDetail {
    /// Field removed.
    FieldRemoved {
        /// Type the field had.
        previous: FieldType,
    },
    /// Field renamed.
    FieldRenamed {
        /// Name in the stored schema.
        from: String,
    },
    /// Type changed.
    TypeChanged {
        /// Stored type.
        from: FieldType,
        /// Declared type.
        to: FieldType,
    },
    /// Field became required.
    RequiredAdded {
        /// Declared type.
        #[serde(rename = "fieldType")]
        field_type: FieldType,
    },
    /// Field became unique.
    UniqueAdded,
    /// A constraint became stricter.
    ConstraintTightened {
        /// The new constraint.
        constraint: Constraint,
    },
}

impl ChangeDetail {
    /// The change kind.
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeDetail::FieldRemoved { .. } => ChangeKind::FieldRemoved,
            ChangeDetail::FieldRenamed { .. } => ChangeKind::FieldRenamed,
            ChangeDetail::TypeChanged { .. } => ChangeKind::TypeChanged,
            ChangeDetail::RequiredAdded { .. } => ChangeKind::RequiredAdded,
            ChangeDetail::UniqueAdded => ChangeKind::UniqueAdded,
            ChangeDetail::ConstraintTightened { .. } => ChangeKind::ConstraintTightened,
        }
    }
}

/// Deterministic per-value transform attached to a migratable change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldTransform {
    /// Convert the stored value to the new type.
    Coerce {
        /// Coercion to apply.
        coercion: Coercion,
    },
    /// Move the value from the old field name.
    Rename {
        /// Old field name.
        from: String,
    },
    /// Cut strings and arrays down to `max_length`.
    Truncate {
        /// New maximum length.
        #[serde(rename = "maxLength")]
        max_length: u64,
    },
    /// Bring numbers into range.
    Clamp {
        /// Lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        /// Upper bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Fill missing or null values.
    FillDefault {
        /// Fill value.
        value: Value,
    },
}

impl std::fmt::Display for FieldTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldTransform::Coerce { coercion } => write!(f, "coerce({})", coercion.name()),
            FieldTransform::Rename { from } => write!(f, "rename(from={})", from),
            FieldTransform::Truncate { max_length } => write!(f, "truncate({})", max_length),
            FieldTransform::Clamp { min, max } => {
                let bound =
                    |b: &Option<f64>| b.map(|v| v.to_string()).unwrap_or_else(|| "_".into());
                write!(f, "clamp({}, {})", bound(min), bound(max))
            }
            FieldTransform::FillDefault { value } => write!(f, "fill_default({})", value),
        }
    }
}

/// One classified difference between the declared and stored schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakingChange {
    /// Field name, in the declared schema's naming.
    pub field: String,
    /// Severity.
    pub severity: Severity,
    /// Applying the change can destroy stored values.
    pub data_loss: bool,
    /// A deterministic transform brings every document into compliance.
    pub migration_possible: bool,
    /// Documents that violate the new shape; [`UNKNOWN_COUNT`] when unknown.
    ///
    /// Zero until the impact estimator fills it.
    pub affected_count: i64,
    /// Transform to apply per document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<FieldTransform>,
    /// Short human-readable summary.
    pub description: String,
    /// Kind-specific payload; serialized as `type` plus its fields.
    #[serde(flatten)]
    pub detail: ChangeDetail,
}

impl BreakingChange {
    pub(crate) fn new(field: impl Into<String>, detail: ChangeDetail, severity: Severity) -> Self {
        Self {
            field: field.into(),
            severity,
            data_loss: false,
            migration_possible: true,
            affected_count: 0,
            transform: None,
            description: String::new(),
            detail,
        }
    }

    pub(crate) fn with_data_loss(mut self, data_loss: bool) -> Self {
        self.data_loss = data_loss;
        self
    }

    pub(crate) fn with_migration_possible(mut self, possible: bool) -> Self {
        self.migration_possible = possible;
        self
    }

    pub(crate) fn with_transform(mut self, transform: Option<FieldTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub(crate) fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The change kind.
    pub fn kind(&self) -> ChangeKind {
        self.detail.kind()
    }

    /// Can be applied without any override.
    pub fn is_auto_migratable(&self) -> bool {
        self.migration_possible && !self.data_loss
    }

    /// Whether the affected count could not be computed.
    pub fn is_count_unknown(&self) -> bool {
        self.affected_count < 0
    }
}
