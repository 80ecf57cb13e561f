//! Core type definitions for collection fields.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RFC 3339 rendering of the Unix epoch, the zero value for dates.
pub const EPOCH_DATE: &str = "1970-01-01T00:00:00+00:00";

/// Data types a collection field can hold.
///
/// Dates and relations are stored as strings (RFC 3339 and the target
/// document id respectively).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// JSON number (integer or float).
    Number,
    /// Boolean value.
    Boolean,
    /// Timestamp stored as an RFC 3339 string.
    Date,
    /// Reference to a document in another collection.
    Relation {
        /// Target collection id.
        collection: String,
    },
    /// Free-form nested object.
    Object,
    /// Homogeneous array.
    Array {
        /// Element type.
        items: Box<FieldType>,
    },
    /// String restricted to a closed set of variants.
    Enum {
        /// Allowed variant values.
        variants: Vec<String>,
    },
    /// Nullable wrapper around another type.
    Optional {
        /// Wrapped type.
        inner: Box<FieldType>,
    },
}

impl FieldType {
    /// Create an array field type.
    pub fn array(items: FieldType) -> Self {
        FieldType::Array {
            items: Box::new(items),
        }
    }

    /// Create an optional field type.
    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional {
            inner: Box::new(inner),
        }
    }

    /// Create an enum field type.
    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldType::Enum {
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a relation field type.
    pub fn relation(collection: impl Into<String>) -> Self {
        FieldType::Relation {
            collection: collection.into(),
        }
    }

    /// Check if this type accepts null.
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional { .. })
    }

    /// Short name used in descriptions and logs.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Relation { .. } => "relation",
            FieldType::Object => "object",
            FieldType::Array { .. } => "array",
            FieldType::Enum { .. } => "enum",
            FieldType::Optional { .. } => "optional",
        }
    }

    /// Check whether a stored value already has this runtime shape.
    pub fn matches_value(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Optional { .. }, Value::Null) => true,
            (FieldType::Optional { inner }, other) => inner.matches_value(other),
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Date, Value::String(s)) => parse_date(s).is_some(),
            (FieldType::Relation { .. }, Value::String(_)) => true,
            (FieldType::Object, Value::Object(_)) => true,
            (FieldType::Array { items }, Value::Array(values)) => {
                values.iter().all(|v| items.matches_value(v))
            }
            (FieldType::Enum { variants }, Value::String(s)) => variants.iter().any(|v| v == s),
            _ => false,
        }
    }

    /// Value used to fill a newly required field that has no explicit default.
    ///
    /// Relations have no meaningful zero value.
    pub fn zero_value(&self) -> Option<Value> {
        match self {
            FieldType::String => Some(Value::String(String::new())),
            FieldType::Number => Some(Value::from(0)),
            FieldType::Boolean => Some(Value::Bool(false)),
            FieldType::Date => Some(Value::String(EPOCH_DATE.to_string())),
            FieldType::Relation { .. } => None,
            FieldType::Object => Some(Value::Object(serde_json::Map::new())),
            FieldType::Array { .. } => Some(Value::Array(Vec::new())),
            FieldType::Enum { variants } => variants.first().cloned().map(Value::String),
            FieldType::Optional { inner } => inner.zero_value(),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Relation { collection } => write!(f, "relation<{}>", collection),
            FieldType::Array { items } => write!(f, "array<{}>", items),
            FieldType::Enum { variants } => write!(f, "enum({})", variants.join("|")),
            FieldType::Optional { inner } => write!(f, "{}?", inner),
            other => f.write_str(other.name()),
        }
    }
}

/// Parse a stored date string.
///
/// Accepts full RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(s: &str) -> Option<DateTime<chrono::FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matches_value() {
        assert!(FieldType::String.matches_value(&json!("a")));
        assert!(!FieldType::String.matches_value(&json!(1)));
        assert!(FieldType::Number.matches_value(&json!(1.5)));
        assert!(FieldType::Date.matches_value(&json!("2024-03-01T10:00:00Z")));
        assert!(FieldType::Date.matches_value(&json!("2024-03-01")));
        assert!(!FieldType::Date.matches_value(&json!("yesterday")));

        let tags = FieldType::array(FieldType::String);
        assert!(tags.matches_value(&json!(["a", "b"])));
        assert!(!tags.matches_value(&json!(["a", 2])));

        let status = FieldType::enumeration(["draft", "published"]);
        assert!(status.matches_value(&json!("draft")));
        assert!(!status.matches_value(&json!("archived")));

        let maybe = FieldType::optional(FieldType::Number);
        assert!(maybe.matches_value(&Value::Null));
        assert!(maybe.matches_value(&json!(3)));
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(FieldType::String.zero_value(), Some(json!("")));
        assert_eq!(FieldType::Number.zero_value(), Some(json!(0)));
        assert_eq!(
            FieldType::enumeration(["a", "b"]).zero_value(),
            Some(json!("a"))
        );
        assert_eq!(FieldType::relation("users").zero_value(), None);
        assert_eq!(
            FieldType::optional(FieldType::Boolean).zero_value(),
            Some(json!(false))
        );
        assert!(FieldType::Date.matches_value(&FieldType::Date.zero_value().unwrap()));
    }

    #[test]
    fn test_serde_shape() {
        let ty = FieldType::optional(FieldType::array(FieldType::relation("media")));
        let json = serde_json::to_value(&ty).unwrap();
        assert_eq!(
            json,
            json!({
                "kind": "optional",
                "inner": {"kind": "array", "items": {"kind": "relation", "collection": "media"}}
            })
        );
        let back: FieldType = serde_json::from_value(json).unwrap();
        assert_eq!(back, ty);
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldType::optional(FieldType::Number).to_string(), "number?");
        assert_eq!(
            FieldType::array(FieldType::String).to_string(),
            "array<string>"
        );
    }
}
