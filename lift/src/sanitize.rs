//! Field sanitization applied before data leaves the process
//!
//! Both the error renderer and the log pipeline run values through this
//! module; whichever is the last code path before egress scrubs the data.
//! The duplication is deliberate.

use serde_json::Value;

/// Key-name fragments that mark a field as sensitive.
///
/// Matching is case-insensitive and substring-based, so `apiKey`,
/// `AUTH_TOKEN` and `card_number` are all caught.
pub const SENSITIVE_TOKENS: &[&str] = &[
    "password",
    "token",
    "secret",
    "key",
    "auth",
    "credential",
    "email",
    "phone",
    "ssn",
    "card",
    "pin",
    "cvv",
];

/// Key names whose values are user content: replaced with a length-only
/// marker rather than redacted outright.
pub const USER_CONTENT_FIELDS: &[&str] = &["body", "query", "message", "comment"];

/// Maximum string length allowed through unchanged.
const MAX_STRING_LEN: usize = 200;

const REDACTED: &str = "[REDACTED]";
const SANITIZED: &str = "[SANITIZED_ERROR]";

/// True when the key name contains any sensitive token.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_TOKENS.iter().any(|t| lower.contains(t))
}

/// True when the key names a user-content field.
pub fn is_user_content_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    USER_CONTENT_FIELDS.iter().any(|f| lower == *f)
}

/// Heuristic for error strings that tend to leak internals (connection
/// strings, file paths, SQL fragments).
fn is_suspicious_message(s: &str) -> bool {
    let lower = s.to_lowercase();
    ["://", "select ", "insert ", "exception", "panicked at", "stack backtrace"]
        .iter()
        .any(|m| lower.contains(m))
}

/// Sanitize a single field value given its key name.
///
/// Sensitive keys are redacted, user-content keys collapse to a length
/// marker, and oversized or suspicious strings collapse to
/// `[SANITIZED_ERROR]`. Maps and arrays are walked recursively.
pub fn sanitize_field_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }
    if is_user_content_key(key) {
        let len = match value {
            Value::String(s) => s.chars().count(),
            other => other.to_string().chars().count(),
        };
        return Value::String(format!("[USER_CONTENT_{}_CHARS]", len));
    }
    sanitize_value(value)
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() > MAX_STRING_LEN || is_suspicious_message(s) {
                Value::String(SANITIZED.to_string())
            } else {
                value.clone()
            }
        }
        Value::Object(map) => {
            let scrubbed = map
                .iter()
                .map(|(k, v)| (k.clone(), sanitize_field_value(k, v)))
                .collect();
            Value::Object(scrubbed)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        other => other.clone(),
    }
}

/// Sanitize every entry of a JSON object in place of building a new map.
pub fn sanitize_map(map: &serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), sanitize_field_value(k, v)))
        .collect()
}

/// Sanitize an error message for surfacing outside the process.
pub fn sanitize_error_message(msg: &str) -> String {
    if msg.chars().count() > MAX_STRING_LEN || is_suspicious_message(msg) {
        SANITIZED.to_string()
    } else {
        msg.to_string()
    }
}
