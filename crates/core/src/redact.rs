//! Payload redaction for audit entries.
//!
//! Walks an arbitrarily nested JSON value and replaces the value of every
//! mapping key that looks sensitive with [`FILTERED_PLACEHOLDER`]. The input
//! is never mutated; a redacted copy is returned.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Replacement written in place of a sensitive value.
pub const FILTERED_PLACEHOLDER: &str = "[Filtered]";

/// Nesting level at which traversal stops and the subtree is filtered wholesale.
pub const MAX_DEPTH: usize = 256;

/// Case-insensitive substring match on key names.
static SENSITIVE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)api|token|key|secret|password|signature").expect("valid sensitive key pattern")
});

/// Returns true if a mapping key names a field whose value must not be stored.
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY.is_match(key)
}

/// Return a redacted copy of `value`.
///
/// - Sequences are redacted element by element.
/// - Mappings keep their keys; a sensitive key has its value replaced by the
///   placeholder no matter what the value was, including nested structures.
/// - Scalars are returned unchanged.
pub fn redact(value: &Value) -> Value {
    redact_at(value, 0)
}

/// Redact an optional payload, keeping absence as absence.
pub fn redact_opt(value: Option<&Value>) -> Option<Value> {
    value.map(redact)
}

fn placeholder() -> Value {
    Value::String(FILTERED_PLACEHOLDER.to_string())
}

fn redact_at(value: &Value, depth: usize) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) if depth >= MAX_DEPTH => placeholder(),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_at(v, depth + 1)).collect()),
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                // Sensitive branches are not walked.
                let cleaned = if is_sensitive_key(key) {
                    placeholder()
                } else {
                    redact_at(val, depth + 1)
                };
                redacted.insert(key.clone(), cleaned);
            }
            Value::Object(redacted)
        }
        _ => value.clone(),
    }
}
