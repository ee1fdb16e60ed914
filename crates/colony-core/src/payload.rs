//! Coercion helpers for structured data arriving from outside the runtime.
//!
//! Upstream collaborators (the LLM in particular) regularly hand back a bare
//! string or number where a record is expected. Every consumer of such data goes
//! through these helpers instead of assuming a shape.

use serde_json::{Map, Value};
use tracing::warn;

/// Key used when a scalar is wrapped into a single-field record.
pub const SCALAR_KEY: &str = "value";

/// Coerce any JSON value into a record.
///
/// - objects pass through,
/// - `null` becomes an empty record,
/// - strings holding a JSON object are parsed,
/// - any other scalar or array is wrapped as `{"value": ...}`.
pub fn coerce_record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        Value::String(text) => match parse_loose_json(&text) {
            Some(Value::Object(map)) => map,
            _ => {
                warn!(value = %truncate(&text, 80), "expected a record, wrapping bare string");
                wrap(Value::String(text))
            }
        },
        other => {
            warn!(value = %other, "expected a record, wrapping scalar");
            wrap(other)
        }
    }
}

fn wrap(value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(SCALAR_KEY.into(), value);
    map
}

/// Read a number that may be bare, wrapped as `{"value": x}`, or a numeric string.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Object(map) if map.len() == 1 => map.get(SCALAR_KEY).and_then(coerce_f64),
        _ => None,
    }
}

/// Read a list of strings from an array, a single string, or nothing.
pub fn coerce_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => vec![],
        Value::String(s) if s.trim().is_empty() => vec![],
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        other => vec![other.to_string()],
    }
}

/// Render a scalar as the text used in template substitution.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse JSON out of free-form model output.
///
/// Tries the whole text, then a fenced code block, then the outermost
/// `{...}` or `[...]` span. Returns `None` when nothing parses.
pub fn parse_loose_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() || v.is_array() {
            return Some(v);
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(end) = after[body_start..].find("```") {
            let body = after[body_start..body_start + end].trim();
            if let Ok(v) = serde_json::from_str::<Value>(body) {
                return Some(v);
            }
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    return Some(v);
                }
            }
        }
    }
    None
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}
