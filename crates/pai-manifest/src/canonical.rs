//! Canonical JSON and stable content hashing.
//!
//! Semantically identical JSON documents must hash identically, or drift
//! detection would fire on formatting noise. The canonical form is:
//!
//! 1. Object keys sorted lexicographically (byte order)
//! 2. No insignificant whitespace
//! 3. Numbers in minimal form (`1`, not `1.0`)
//! 4. Arrays in original order
//! 5. Nested objects canonicalized recursively
//!
//! The hash is the lowercase-hex SHA-256 of the UTF-8 canonical string.
//!
//! Round-trip law: for every value `v`,
//! `hash(canonicalize(v)) == hash(canonicalize(parse(canonicalize(v))))`.
//!
//! ## Example
//!
//! ```rust
//! use pai_manifest::{canonicalize, hash_canonical};
//! use serde_json::json;
//!
//! let a = json!({"b": 1, "a": 2});
//! let b = json!({"a": 2, "b": 1});
//!
//! assert_eq!(canonicalize(&a), r#"{"a":2,"b":1}"#);
//! assert_eq!(hash_canonical(&a), hash_canonical(&b));
//! ```

use crate::error::ManifestError;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonicalizes a JSON value into its deterministic string form.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Lowercase-hex SHA-256 of the canonical form of `value`.
pub fn hash_canonical(value: &Value) -> String {
    hash_str(&canonicalize(value))
}

/// Lowercase-hex SHA-256 of a raw string.
pub fn hash_str(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Byte-order key sort is the canonical ordering.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key.as_str()]);
            }
            out.push('}');
        }
    }
}

/// Minimal number form: integers without a fraction, floats via the
/// shortest round-trippable rendering.
fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
        Some(f) => format!("{}", f),
        None => n.to_string(),
    }
}

/// Minimal escaping: `"`, `\`, and control characters only.
fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\x20' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Converts a YAML value into JSON for canonical hashing.
///
/// Rejects mappings with non-string keys and YAML tags; neither has a
/// JSON representation and neither belongs in a manifest.
pub fn yaml_to_json(value: &serde_yaml::Value) -> Result<Value, ManifestError> {
    yaml_to_json_at(value, "")
}

fn yaml_to_json_at(value: &serde_yaml::Value, path: &str) -> Result<Value, ManifestError> {
    match value {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::from(u))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| ManifestError::Unrepresentable {
                        path: path.to_string(),
                        message: format!("non-finite number {}", f),
                    })
            } else {
                Err(ManifestError::Unrepresentable {
                    path: path.to_string(),
                    message: "unrepresentable number".to_string(),
                })
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s.clone())),
        serde_yaml::Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(yaml_to_json_at(item, &join(path, &i.to_string()))?);
            }
            Ok(Value::Array(out))
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                let key = key
                    .as_str()
                    .ok_or_else(|| ManifestError::Unrepresentable {
                        path: path.to_string(),
                        message: "mapping key is not a string".to_string(),
                    })?;
                out.insert(key.to_string(), yaml_to_json_at(val, &join(path, key))?);
            }
            Ok(Value::Object(out))
        }
        serde_yaml::Value::Tagged(tagged) => Err(ManifestError::Unrepresentable {
            path: path.to_string(),
            message: format!("unexpected YAML tag {}", tagged.tag),
        }),
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}
