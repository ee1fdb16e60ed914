//! # Rule engine
//!
//! Pure stimulus → action matching for reflexive behaviour. A rule's condition
//! is a JSON object matched structurally against the stimulus; every matching
//! rule fires, in declaration order.
//!
//! Action templates may reference stimulus fields with `{field}` or
//! `{nested.field}`. A template string that is exactly one placeholder takes
//! the field's value with its type; otherwise the field is rendered as text.

use colony_core::payload::scalar_text;
use colony_core::{ColonyError, Rule};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.]*)\}").expect("placeholder pattern compiles")
});

/// The outcome of evaluating a rule set against one stimulus.
#[derive(Debug, Default)]
pub struct RuleMatches {
    /// Instantiated actions, in rule declaration order.
    pub actions: Vec<Value>,
    /// Rules whose condition matched but whose template could not be filled.
    pub failures: Vec<ColonyError>,
    /// Number of rules whose condition matched.
    pub matched: usize,
}

impl RuleMatches {
    pub fn is_empty(&self) -> bool {
        self.matched == 0
    }
}

/// Evaluate every rule against `stimulus`.
pub fn match_rules(stimulus: &Map<String, Value>, rules: &[Rule]) -> RuleMatches {
    let mut out = RuleMatches::default();
    for (index, rule) in rules.iter().enumerate() {
        if !condition_matches(&rule.condition, stimulus) {
            continue;
        }
        out.matched += 1;
        match instantiate(&rule.action, stimulus) {
            Ok(action) => out.actions.push(tag_response(action, stimulus)),
            Err(reason) => out.failures.push(ColonyError::Template {
                rule: index,
                reason,
            }),
        }
    }
    out
}

/// Every condition key must be present with an equal value; nested objects
/// match recursively. Extra stimulus keys are ignored.
pub fn condition_matches(condition: &Map<String, Value>, stimulus: &Map<String, Value>) -> bool {
    condition.iter().all(|(key, expected)| match stimulus.get(key) {
        Some(actual) => value_matches(expected, actual),
        None => false,
    })
}

fn value_matches(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => condition_matches(e, a),
        (Value::Number(e), Value::Number(a)) => match (e.as_f64(), a.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => e == a,
        },
        _ => expected == actual,
    }
}

/// Look up a dotted path in the stimulus.
fn lookup<'a>(stimulus: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = stimulus.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn instantiate(template: &Value, stimulus: &Map<String, Value>) -> Result<Value, String> {
    match template {
        Value::String(s) => fill_string(s, stimulus),
        Value::Array(items) => items
            .iter()
            .map(|item| instantiate(item, stimulus))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), instantiate(v, stimulus)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn fill_string(s: &str, stimulus: &Map<String, Value>) -> Result<Value, String> {
    if !s.contains('{') {
        return Ok(Value::String(s.to_string()));
    }

    // Whole-string placeholder keeps the field's type.
    if let Some(caps) = PLACEHOLDER.captures(s)
        && caps.get(0).map(|m| m.as_str()) == Some(s)
    {
        let path = &caps[1];
        let value = lookup(stimulus, path).ok_or_else(|| format!("missing field '{path}'"))?;
        return match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(value.clone()),
            _ => Err(format!("field '{path}' is not a scalar")),
        };
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(s) {
        let Some(whole) = caps.get(0) else { continue };
        let path = &caps[1];
        let value = lookup(stimulus, path).ok_or_else(|| format!("missing field '{path}'"))?;
        let text = scalar_text(value).ok_or_else(|| format!("field '{path}' is not a scalar"))?;
        out.push_str(&s[last..whole.start()]);
        out.push_str(&text);
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

/// Link produced actions to the stimulus that triggered them.
fn tag_response(action: Value, stimulus: &Map<String, Value>) -> Value {
    let Some(id) = stimulus.get("id").filter(|v| !v.is_null()) else {
        return action;
    };
    match action {
        Value::Object(mut map) => {
            map.entry("in_response_to").or_insert_with(|| id.clone());
            Value::Object(map)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| tag_response(item, stimulus))
                .collect(),
        ),
        other => other,
    }
}
