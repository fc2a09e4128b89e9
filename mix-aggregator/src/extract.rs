//! Dot-path lookups over parsed JSON documents.
//!
//! Missing paths are not errors: scalars degrade to `""` and arrays to `[]`
//! so feeds can leave optional sections out.

use serde_json::Value;

use crate::types::Result;

pub fn parse_document(data: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(data)?)
}

/// Walk `path` (`a.b.0.c`). Numeric segments index into arrays.
/// An empty path is the value itself.
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(document);
    }
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn extract_scalar(document: &Value, path: &str) -> String {
    match lookup(document, path) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn extract_array<'a>(document: &'a Value, path: &str) -> &'a [Value] {
    match lookup(document, path) {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}
