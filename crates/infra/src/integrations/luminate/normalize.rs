//! One-vs-many response normalization.
//!
//! The remote returns a bare object where a list has exactly one element
//! and an array otherwise. Every response boundary runs list-shaped fields
//! through [`one_or_many`] before iterating, instead of ad hoc per-call
//! checks.

use serde_json::Value;

/// View a response field as a list regardless of its wire shape.
///
/// - missing or `null` -> empty list
/// - array -> its elements
/// - anything else -> a single-element list
pub fn one_or_many(field: Option<&Value>) -> Vec<&Value> {
    match field {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

/// Stringify a scalar response field. The remote is inconsistent about
/// returning numbers vs. numeric strings.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// True when a response flag reads as boolean true (`true` or `"true"`).
pub fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// True when a response flag reads as boolean false (`false` or `"false"`).
pub fn is_false(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !*b,
        Value::String(s) => s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}
