//! Collection schema model.
//!
//! Schemas are immutable snapshots: a fresh value describes each state, and
//! comparisons never mutate their inputs.

mod coerce;
mod field;
mod schema;
mod types;

pub use coerce::{Coercion, CoercionError, Compatibility};
pub use field::{Constraint, FieldConstraints, FieldDef};
pub use schema::Schema;
pub use types::{parse_date, FieldType, EPOCH_DATE};
