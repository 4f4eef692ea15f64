// Field-by-field coercion helpers for loosely typed provider payloads.
// Every helper returns None instead of propagating NaN, infinities or junk.

use crate::models::TOKEN_RECORD_FIELDS;
use serde_json::{Map, Value};

/// Finite number from a JSON number or a numeric string.
pub fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// Non-negative integer count. Fractional inputs are rounded.
pub fn count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) if n.is_u64() => n.as_u64(),
        other => number(Some(other))
            .filter(|n| *n >= 0.0 && *n <= u64::MAX as f64)
            .map(|n| n.round() as u64),
    }
}

/// Trimmed non-empty string. Numbers are rendered, everything else rejected.
pub fn text(value: Option<&Value>) -> Option<String> {
    let rendered = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

/// First key in `keys` that yields a finite number.
pub fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| number(obj.get(*key)))
}

/// First key in `keys` that yields a non-empty string.
pub fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(obj.get(*key)))
}

/// First key in `keys` that yields a count.
pub fn first_count(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| count(obj.get(*key)))
}

/// Copy every field not in `consumed` so nothing the provider sent is lost.
/// Keys that collide with a typed record field are dropped.
pub fn passthrough(obj: &Map<String, Value>, consumed: &[&str]) -> Map<String, Value> {
    obj.iter()
        .filter(|(key, value)| {
            let key = key.as_str();
            !consumed.contains(&key) && !TOKEN_RECORD_FIELDS.contains(&key) && !value.is_null()
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
