//! Canonical JSON encoding.
//!
//! Object keys are sorted byte-wise at every nesting level, no whitespace is
//! emitted, strings use `serde_json`'s escaping, and numbers must be integers
//! rendered as plain decimals. The output depends only on the value, never on
//! the order keys were inserted or parsed in.

use serde_json::Value;

use crate::nostr::error::{NostrError, Result};

/// Encodes `value` in canonical form.
///
/// # Errors
///
/// Returns [`NostrError::Encoding`] if the value contains a non-integer number.
///
/// # Example
///
/// ```
/// use relay_probe::nostr::canonical_json;
/// use serde_json::json;
///
/// let value = json!({ "b": [1, 2], "a": "x" });
/// assert_eq!(canonical_json(&value).unwrap(), r#"{"a":"x","b":[1,2]}"#);
/// ```
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.push_str(&i.to_string());
            } else if let Some(u) = n.as_u64() {
                out.push_str(&u.to_string());
            } else {
                return Err(NostrError::Encoding(format!(
                    "non-integer number in canonical form: {n}"
                )));
            }
        }
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key)?;
                out.push(':');
                write_value(out, item)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) -> Result<()> {
    let escaped = serde_json::to_string(s).map_err(|e| NostrError::Encoding(e.to_string()))?;
    out.push_str(&escaped);
    Ok(())
}
