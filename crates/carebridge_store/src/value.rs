//! Field values stored in rows.

use chrono::{DateTime, SecondsFormat, Utc};

/// A scalar (or structured) column value.
///
/// Richer than JSON on purpose: date/time values stay typed in the
/// store so the export sanitizer can canonicalize them, and
/// structured values stay distinguishable so the sanitizer's
/// documented null-out behavior is observable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    Text(String),
    /// Date/time with timezone.
    DateTime(DateTime<Utc>),
    /// Structured (JSON) column.
    Json(serde_json::Value),
}

impl Value {
    /// Canonical RFC 3339 string for a datetime, millisecond
    /// precision, UTC.
    pub fn canonical_timestamp(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Returns the text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}
