//! Canonical-JSON dedupe key hashing.
//!
//! A dedupe key must be stable regardless of field insertion order or the
//! `serde_json::Map` backing collection in use, so canonicalization here is
//! done explicitly (recursive key sort + minified rendering) rather than
//! relying on a particular `serde_json` feature flag.

use serde_json::Value;
use sha2::{Digest, Sha256};

fn canonicalize(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push_str(&serde_json::to_string(s).expect("string serialization cannot fail"));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonicalize(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string serialization cannot fail"));
                out.push(':');
                canonicalize(&map[*key], out);
            }
            out.push('}');
        }
    }
}

/// Render `value` as a minified JSON string with object keys sorted at every
/// nesting level, string-normalized through `serde_json`'s own escaping.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    canonicalize(value, &mut out);
    out
}

/// SHA-256 hex digest of the canonical JSON rendering of `payload` — the
/// dedupe key a write's payload hashes to.
pub fn dedupe_key(payload: &Value) -> String {
    let canonical = canonical_json(payload);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_stable_regardless_of_field_order() {
        let a = json!({"b": 2, "a": 1});
        let b = json!({"a": 1, "b": 2});
        assert_eq!(dedupe_key(&a), dedupe_key(&b));
    }

    #[test]
    fn key_differs_on_value_change() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(dedupe_key(&a), dedupe_key(&b));
    }

    #[test]
    fn key_is_64_hex_chars() {
        let key = dedupe_key(&json!({"x": "y"}));
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn nested_object_keys_are_sorted_too() {
        let a = json!({"outer": {"z": 1, "a": 2}});
        let b = json!({"outer": {"a": 2, "z": 1}});
        assert_eq!(dedupe_key(&a), dedupe_key(&b));
    }
}
