//! Credential redaction for structured log fields.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Replacement written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

const DENYLIST_KEYS: [&str; 9] = [
    "signature",
    "signing_key",
    "secret",
    "token",
    "password",
    "authorization",
    "cookie",
    "private_key",
    "api_key",
];

/// Redact every field whose key names a credential, recursing into objects
/// and arrays. Long hex strings are redacted regardless of key.
pub fn redact_fields(fields: &mut HashMap<String, Value>) {
    for (key, value) in fields.iter_mut() {
        *value = redact_value(key, value);
    }
}

fn redact_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) if is_long_hex(s) => Value::String(REDACTED.to_string()),
        Value::String(s) => Value::String(mask_embedded_signatures(s)),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), redact_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_value(key, item))
                .collect::<Vec<_>>(),
        ),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}

// Hex-encoded MACs: a bare SHA-256 digest is 64 chars, `v0=` adds a prefix.
fn is_long_hex(value: &str) -> bool {
    let digits = value.strip_prefix("v0=").unwrap_or(value);
    digits.len() >= 48 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

/// Replace `v0=<hex>` signatures inside a larger string, such as a raw
/// frame logged verbatim.
fn mask_embedded_signatures(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("v0=") {
        let after = &rest[start + 3..];
        let hex_len = after
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(after.len());
        out.push_str(&rest[..start]);
        if hex_len >= 48 {
            out.push_str(REDACTED);
        } else {
            out.push_str(&rest[start..start + 3 + hex_len]);
        }
        rest = &after[hex_len..];
    }
    out.push_str(rest);
    out
}
