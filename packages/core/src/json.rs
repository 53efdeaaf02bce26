//! Lenient readers for the external binary's JSON output.
//!
//! The JSON schema of `tailscale` is not versioned from our side, so every
//! read falls back to an empty value when a key is missing or has an
//! unexpected type. A `#[derive(Deserialize)]` model with `#[serde(default)]`
//! covers only missing keys; a mistyped field would fail the whole document,
//! so fields are read one by one from a `serde_json::Value` instead.

use serde_json::{Map, Value};

/// Reads a string field, or an empty string.
pub(crate) fn read_str(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Reads the first present string field among several spellings of a key.
pub(crate) fn read_str_any(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Reads a boolean field, or `false`.
pub(crate) fn read_bool(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Reads the first present boolean field among several spellings of a key.
pub(crate) fn read_bool_any(obj: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_bool))
        .unwrap_or(false)
}

/// Reads an integer field, or zero.
///
/// Accepts JSON numbers as well as numeric strings, since ids show up in
/// both forms depending on the client version.
pub(crate) fn read_i64(obj: &Map<String, Value>, key: &str) -> i64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|v| i64::try_from(v).ok()))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Reads an array of strings; non-string entries are skipped.
pub(crate) fn read_str_list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Returns a nested object field, if it is one.
pub(crate) fn read_object<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}
