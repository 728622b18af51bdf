//! # Payload Redaction
//!
//! Masks sensitive fields before a JSON payload is written to a log record
//! (spec §4.9). Never mutates the payload that is actually dispatched or
//! stored — only the copy handed to `tracing`.

use serde_json::Value;

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "authorization",
    "apikey",
    "cookie",
    "credentials",
];

const REDACTED: &str = "[REDACTED]";

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|needle| lower.contains(needle))
}

/// Return a redacted copy of `value` suitable for logging: any object key
/// matching a sensitive-field name (case-insensitive substring match) has
/// its value replaced with `[REDACTED]`, recursively through nested objects
/// and arrays.
pub fn redact_for_logging(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(k, v)| {
                    if is_sensitive_key(k) {
                        (k.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (k.clone(), redact_for_logging(v))
                    }
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_for_logging).collect()),
        other => other.clone(),
    }
}
