//! Impact estimation.
//!
//! Fills in `affected_count` on each change by asking the store how many
//! documents violate the new shape, and adjusts severity where stored data
//! decides it. Count failures never abort the estimate; they become the
//! [`UNKNOWN_COUNT`] sentinel plus a warning.

use super::change::{BreakingChange, ChangeDetail, ChangeKind, FieldTransform, UNKNOWN_COUNT};
use super::error::{ErrorCode, Severity};
use crate::error::StoreError;
use crate::store::{DataStore, DocumentFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// A non-fatal problem found while reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateWarning {
    /// Error code.
    pub code: ErrorCode,
    /// Field concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Details.
    pub message: String,
}

impl EstimateWarning {
    pub(crate) fn new(code: ErrorCode, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code,
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Changes annotated with live document counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// Annotated changes, same order as the input.
    pub changes: Vec<BreakingChange>,
    /// Documents in the collection; [`UNKNOWN_COUNT`] when unknown.
    pub document_count: i64,
    /// Read-side warnings.
    pub warnings: Vec<EstimateWarning>,
}

impl Estimate {
    /// Any change can destroy stored values.
    pub fn data_loss_potential(&self) -> bool {
        self.changes.iter().any(|c| c.data_loss)
    }

    /// Every change applies without override and every count is known.
    pub fn can_auto_migrate(&self) -> bool {
        self.document_count >= 0
            && self
                .changes
                .iter()
                .all(|c| c.is_auto_migratable() && !c.is_count_unknown())
    }
}

/// Annotates changes with affected-document counts.
pub struct ImpactEstimator<'a> {
    store: &'a dyn DataStore,
}

impl<'a> ImpactEstimator<'a> {
    /// Create an estimator over a store.
    pub fn new(store: &'a dyn DataStore) -> Self {
        Self { store }
    }

    /// Count affected documents for every change.
    ///
    /// Reads only.
    #[instrument(skip(self, changes), fields(changes = changes.len()))]
    pub fn estimate(&self, collection: &str, changes: Vec<BreakingChange>) -> Estimate {
        let mut warnings = Vec::new();

        let document_count = match self.store.count_documents(collection, &DocumentFilter::All) {
            Ok(n) => n as i64,
            Err(e) => {
                warn!(collection, error = %e, "Failed to count documents");
                warnings.push(EstimateWarning::new(
                    ErrorCode::EstimateUnavailable,
                    None,
                    format!("document count unavailable: {}", e),
                ));
                UNKNOWN_COUNT
            }
        };

        // Stored documents still use the old name of a renamed field.
        let stored_names: HashMap<String, String> = changes
            .iter()
            .filter_map(|c| match &c.detail {
                ChangeDetail::FieldRenamed { from } => Some((c.field.clone(), from.clone())),
                _ => None,
            })
            .collect();

        let mut annotated = Vec::with_capacity(changes.len());
        for mut change in changes {
            let stored = stored_names
                .get(&change.field)
                .cloned()
                .unwrap_or_else(|| change.field.clone());

            let filter = affected_filter(&change, &stored);
            let count =
                self.count(collection, &filter, &change.field, document_count, &mut warnings);
            change.affected_count = count;

            self.adjust(collection, &stored, &mut change, &mut warnings);
            annotated.push(change);
        }

        let estimate = Estimate {
            changes: annotated,
            document_count,
            warnings,
        };

        debug!(
            collection,
            document_count,
            can_auto_migrate = estimate.can_auto_migrate(),
            data_loss = estimate.data_loss_potential(),
            warnings = estimate.warnings.len(),
            "Estimated impact"
        );

        estimate
    }

    fn count(
        &self,
        collection: &str,
        filter: &DocumentFilter,
        field: &str,
        document_count: i64,
        warnings: &mut Vec<EstimateWarning>,
    ) -> i64 {
        match self.store.count_documents(collection, filter) {
            Ok(n) => n as i64,
            Err(StoreError::UnsupportedFilter(reason)) => {
                warn!(
                    collection,
                    field,
                    op = filter.op(),
                    %reason,
                    "Filter unsupported, using document count"
                );
                warnings.push(EstimateWarning::new(
                    ErrorCode::EstimateUnavailable,
                    Some(field),
                    format!(
                        "{} count imprecise ({}); using document count as upper bound",
                        filter.op(),
                        reason
                    ),
                ));
                document_count
            }
            Err(e) => {
                warn!(collection, field, op = filter.op(), error = %e, "Count failed");
                warnings.push(EstimateWarning::new(
                    ErrorCode::EstimateUnavailable,
                    Some(field),
                    format!("{} count failed: {}", filter.op(), e),
                ));
                UNKNOWN_COUNT
            }
        }
    }

    /// Apply data-dependent classification once the count is known.
    fn adjust(
        &self,
        collection: &str,
        stored: &str,
        change: &mut BreakingChange,
        warnings: &mut Vec<EstimateWarning>,
    ) {
        let count = change.affected_count;

        match change.kind() {
            ChangeKind::TypeChanged => {
                let Some(FieldTransform::Coerce { coercion }) = &change.transform else {
                    return;
                };
                if !coercion.is_fallible() {
                    return;
                }
                let filter = DocumentFilter::NotCoercible {
                    field: stored.to_string(),
                    coercion: coercion.clone(),
                };
                let failing =
                    self.count(collection, &filter, &change.field, UNKNOWN_COUNT, warnings);
                if failing < 0 {
                    change.affected_count = UNKNOWN_COUNT;
                } else if failing > 0 {
                    change.severity = Severity::Blocking;
                    change.data_loss = true;
                    change.migration_possible = false;
                    change.transform = None;
                    change.description = format!(
                        "{}; {} stored value(s) cannot be converted",
                        change.description, failing
                    );
                }
            }
            ChangeKind::RequiredAdded => {
                if count > 0 {
                    change.severity = Severity::Blocking;
                } else if count == 0 {
                    change.migration_possible = true;
                }
            }
            ChangeKind::UniqueAdded | ChangeKind::ConstraintTightened => {
                if count == 0 {
                    change.severity = Severity::Warning;
                    change.migration_possible = true;
                }
            }
            ChangeKind::FieldRemoved | ChangeKind::FieldRenamed => {}
        }
    }
}

/// Filter selecting the documents a change affects, using stored field names.
fn affected_filter(change: &BreakingChange, stored: &str) -> DocumentFilter {
    let field = stored.to_string();
    match &change.detail {
        ChangeDetail::FieldRemoved { .. } | ChangeDetail::FieldRenamed { .. } => {
            DocumentFilter::FieldPresent { field }
        }
        ChangeDetail::TypeChanged { to, .. } => DocumentFilter::TypeMismatch {
            field,
            expected: to.clone(),
        },
        ChangeDetail::RequiredAdded { .. } => DocumentFilter::FieldMissing { field },
        ChangeDetail::UniqueAdded => DocumentFilter::Duplicated { field },
        ChangeDetail::ConstraintTightened { constraint } => DocumentFilter::ConstraintViolated {
            field,
            constraint: constraint.clone(),
        },
    }
}
