//! Type coercion table.
//!
//! Classifies every pair of field types as identical, losslessly coercible,
//! conditionally coercible (depends on the stored values), or lossy, and
//! applies the coercion to individual values.

use super::types::{parse_date, FieldType};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

/// How a stored value of one type can be brought into another type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coercion {
    /// `T` to `T?`; values are kept as they are.
    WrapOptional,
    /// `T?` to `T`; fails on null.
    UnwrapOptional,
    /// Render numbers as strings.
    NumberToString,
    /// Render booleans as `"true"` / `"false"`.
    BooleanToString,
    /// Dates are already strings.
    DateToString,
    /// Relation ids are already strings.
    RelationToString,
    /// Enum variants are already strings.
    EnumToString,
    /// The target enum contains every source variant.
    WidenEnum,
    /// Wrap a single value into a one-element array.
    WrapInArray,
    /// Parse numeric strings.
    ParseNumber,
    /// Parse `"true"` / `"false"`.
    ParseBoolean,
    /// Parse RFC 3339 or `YYYY-MM-DD` strings into normalized dates.
    ParseDate,
    /// Apply the inner coercion to non-null values, pass null through.
    Nullable(Box<Coercion>),
    /// Apply the inner coercion to every array element.
    Elementwise(Box<Coercion>),
}

/// Classification of a type change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    /// Same type, nothing to do.
    Identical,
    /// Every value of the old type converts without loss.
    Lossless(Coercion),
    /// Values convert only if they have the right content, e.g. numeric strings.
    Conditional(Coercion),
    /// No deterministic conversion exists.
    Lossy,
}

impl Compatibility {
    /// Classify a change from `from` to `to`.
    pub fn between(from: &FieldType, to: &FieldType) -> Self {
        use FieldType as T;

        if from == to {
            return Compatibility::Identical;
        }

        match (from, to) {
            (T::Optional { inner: a }, T::Optional { inner: b }) => {
                Self::between(a, b).wrap(|c| Coercion::Nullable(Box::new(c)))
            }
            (a, T::Optional { inner: b }) if b.as_ref() == a => {
                Compatibility::Lossless(Coercion::WrapOptional)
            }
            (a, T::Optional { inner: b }) => {
                Self::between(a, b).wrap(|c| Coercion::Nullable(Box::new(c)))
            }
            (T::Optional { inner: a }, b) if a.as_ref() == b => {
                Compatibility::Conditional(Coercion::UnwrapOptional)
            }

            (T::Number, T::String) => Compatibility::Lossless(Coercion::NumberToString),
            (T::Boolean, T::String) => Compatibility::Lossless(Coercion::BooleanToString),
            (T::Date, T::String) => Compatibility::Lossless(Coercion::DateToString),
            (T::Relation { .. }, T::String) => Compatibility::Lossless(Coercion::RelationToString),
            (T::Enum { .. }, T::String) => Compatibility::Lossless(Coercion::EnumToString),

            (T::Enum { variants: old }, T::Enum { variants: new }) => {
                if old.iter().all(|v| new.contains(v)) {
                    Compatibility::Lossless(Coercion::WidenEnum)
                } else {
                    Compatibility::Lossy
                }
            }

            (T::String, T::Number) => Compatibility::Conditional(Coercion::ParseNumber),
            (T::String, T::Boolean) => Compatibility::Conditional(Coercion::ParseBoolean),
            (T::String, T::Date) => Compatibility::Conditional(Coercion::ParseDate),

            (T::Array { items: a }, T::Array { items: b }) => {
                Self::between(a, b).wrap(|c| Coercion::Elementwise(Box::new(c)))
            }
            (a, T::Array { items: b }) if b.as_ref() == a => {
                Compatibility::Lossless(Coercion::WrapInArray)
            }

            _ => Compatibility::Lossy,
        }
    }

    /// The coercion to apply, if any.
    pub fn coercion(&self) -> Option<&Coercion> {
        match self {
            Compatibility::Lossless(c) | Compatibility::Conditional(c) => Some(c),
            Compatibility::Identical | Compatibility::Lossy => None,
        }
    }

    fn wrap(self, f: impl FnOnce(Coercion) -> Coercion) -> Self {
        match self {
            Compatibility::Lossless(c) => Compatibility::Lossless(f(c)),
            Compatibility::Conditional(c) => Compatibility::Conditional(f(c)),
            other => other,
        }
    }
}

/// Error converting a single value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    /// A null value cannot become a non-nullable type.
    #[error("null value cannot be converted to a required type")]
    NullValue,

    /// The stored value does not have the expected source type.
    #[error("expected {expected} value, found {found}")]
    UnexpectedType {
        /// Expected JSON kind.
        expected: &'static str,
        /// Found JSON kind.
        found: &'static str,
    },

    /// The string is not a number.
    #[error("'{0}' is not numeric")]
    NotNumeric(String),

    /// The string is not a boolean.
    #[error("'{0}' is not a boolean")]
    NotBoolean(String),

    /// The string is not a date.
    #[error("'{0}' is not a date")]
    NotDate(String),

    /// An array element failed.
    #[error("element {index}: {source}")]
    Element {
        /// Position in the array.
        index: usize,
        /// Underlying failure.
        source: Box<CoercionError>,
    },
}

impl Coercion {
    /// Whether `apply` can fail for values of the source type.
    pub fn is_fallible(&self) -> bool {
        match self {
            Coercion::UnwrapOptional
            | Coercion::ParseNumber
            | Coercion::ParseBoolean
            | Coercion::ParseDate => true,
            Coercion::Nullable(inner) | Coercion::Elementwise(inner) => inner.is_fallible(),
            _ => false,
        }
    }

    /// Function name, for descriptions.
    pub fn name(&self) -> String {
        match self {
            Coercion::WrapOptional => "wrap_optional".into(),
            Coercion::UnwrapOptional => "unwrap_optional".into(),
            Coercion::NumberToString => "number_to_string".into(),
            Coercion::BooleanToString => "boolean_to_string".into(),
            Coercion::DateToString => "date_to_string".into(),
            Coercion::RelationToString => "relation_to_string".into(),
            Coercion::EnumToString => "enum_to_string".into(),
            Coercion::WidenEnum => "widen_enum".into(),
            Coercion::WrapInArray => "wrap_in_array".into(),
            Coercion::ParseNumber => "parse_number".into(),
            Coercion::ParseBoolean => "parse_boolean".into(),
            Coercion::ParseDate => "parse_date".into(),
            Coercion::Nullable(inner) => format!("nullable({})", inner.name()),
            Coercion::Elementwise(inner) => format!("each({})", inner.name()),
        }
    }

    /// Convert one stored value.
    ///
    /// Values already in the target shape are returned unchanged, so running a
    /// coercion twice is harmless.
    pub fn apply(&self, value: &Value) -> Result<Value, CoercionError> {
        match self {
            Coercion::WrapOptional
            | Coercion::DateToString
            | Coercion::RelationToString
            | Coercion::EnumToString
            | Coercion::WidenEnum => Ok(value.clone()),

            Coercion::UnwrapOptional => match value {
                Value::Null => Err(CoercionError::NullValue),
                other => Ok(other.clone()),
            },

            Coercion::NumberToString => match value {
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::String(_) => Ok(value.clone()),
                other => Err(unexpected("number", other)),
            },

            Coercion::BooleanToString => match value {
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                Value::String(_) => Ok(value.clone()),
                other => Err(unexpected("boolean", other)),
            },

            Coercion::WrapInArray => match value {
                Value::Null => Ok(Value::Null),
                Value::Array(_) => Ok(value.clone()),
                other => Ok(Value::Array(vec![other.clone()])),
            },

            Coercion::ParseNumber => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) => parse_number(s)
                    .map(Value::Number)
                    .ok_or_else(|| CoercionError::NotNumeric(s.clone())),
                Value::Null => Err(CoercionError::NullValue),
                other => Err(unexpected("string", other)),
            },

            Coercion::ParseBoolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(CoercionError::NotBoolean(s.clone())),
                },
                Value::Null => Err(CoercionError::NullValue),
                other => Err(unexpected("string", other)),
            },

            Coercion::ParseDate => match value {
                Value::String(s) => parse_date(s)
                    .map(|dt| Value::String(dt.to_rfc3339()))
                    .ok_or_else(|| CoercionError::NotDate(s.clone())),
                Value::Null => Err(CoercionError::NullValue),
                other => Err(unexpected("string", other)),
            },

            Coercion::Nullable(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => inner.apply(other),
            },

            Coercion::Elementwise(inner) => match value {
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        inner.apply(item).map_err(|e| CoercionError::Element {
                            index,
                            source: Box::new(e),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                Value::Null => Ok(Value::Null),
                other => Err(unexpected("array", other)),
            },
        }
    }
}

impl Coercion {
    /// Convert a stored field value.
    ///
    /// Null means "no value" for every coercion except `UnwrapOptional`,
    /// whose whole job is to reject it.
    pub fn apply_stored(&self, value: &Value) -> Result<Value, CoercionError> {
        match value {
            Value::Null if *self != Coercion::UnwrapOptional => Ok(Value::Null),
            _ => self.apply(value),
        }
    }
}

impl std::fmt::Display for Coercion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn unexpected(expected: &'static str, found: &Value) -> CoercionError {
    CoercionError::UnexpectedType {
        expected,
        found: json_kind(found),
    }
}

/// JSON kind of a value, for error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
