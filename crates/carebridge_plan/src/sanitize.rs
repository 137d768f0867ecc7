//! Scalar field sanitization for export.

use carebridge_store::Value;
use serde_json::Number;

/// Converts a stored field value into its wire representation.
///
/// Strings, numbers, and booleans pass through unchanged; date/time
/// values become canonical RFC 3339 strings; anything else becomes
/// JSON null. The null-out is lossy by design — structured columns do
/// not survive sync — and callers log the first occurrence per export
/// so operators can see it happening.
pub fn sanitize_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::DateTime(dt) => serde_json::Value::String(Value::canonical_timestamp(dt)),
        Value::Json(_) => serde_json::Value::Null,
    }
}

/// True if sanitizing this value loses information.
pub(crate) fn is_lossy(value: &Value) -> bool {
    match value {
        Value::Json(_) => true,
        Value::Float(f) => Number::from_f64(*f).is_none(),
        _ => false,
    }
}
