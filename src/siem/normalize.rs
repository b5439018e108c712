use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

pub(crate) const UNTITLED: &str = "Untitled alert";

/// Look up a dotted field path in a document.
///
/// Elastic documents mix flattened keys (`"kibana.alert.rule.name"`) with nested
/// objects, so every split of the path into a literal key plus remainder is tried.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    walk(value, &segments)
}

fn walk<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    if segments.is_empty() {
        return Some(value);
    }
    let object = value.as_object()?;
    for split in (1..=segments.len()).rev() {
        let key = segments[..split].join(".");
        if let Some(child) = object.get(&key) {
            if let Some(found) = walk(child, &segments[split..]) {
                return Some(found);
            }
        }
    }
    None
}

/// First non-empty string among the given paths
pub(crate) fn first_string(value: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(as_text)
}

pub(crate) fn first_number(value: &Value, paths: &[&str]) -> Option<f64> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(as_text).collect(),
        Some(other) => as_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// RFC 3339 string or epoch milliseconds
pub(crate) fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
