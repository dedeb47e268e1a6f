//! Normalization of event field values into [`CanonicalHex`].
//!
//! Light clients expose account ids in transfer events in several shapes: a nested
//! byte array (`[[212, 53, ...]]`), a flat byte array, or a hex string. Everything
//! is folded into one canonical form so that comparison is plain equality.

use serde_json::{Map, Value};

use crate::types::CanonicalHex;

/// Converts an event field into canonical hex.
///
/// Returns `None` for any shape that is not one of the recognized encodings, which
/// callers treat as "cannot compare". Never panics.
pub fn to_hex(value: &Value) -> Option<CanonicalHex> {
    match value {
        Value::Array(items) => {
            let bytes = match items.as_slice() {
                [Value::Array(inner)] => inner.as_slice(),
                _ => items.as_slice(),
            };
            byte_values(bytes).map(CanonicalHex::from_bytes)
        }
        Value::String(s) => CanonicalHex::parse(s),
        _ => None,
    }
}

/// Rewrites every byte-array (or hex) field into canonical hex, leaving the rest untouched.
pub fn normalize_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| {
            let value = match to_hex(value) {
                Some(hex) => Value::String(hex.to_string()),
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn byte_values(values: &[Value]) -> Option<Vec<u8>> {
    values
        .iter()
        .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_one_level_of_nesting() {
        assert_eq!(
            to_hex(&json!([[0xde, 0xad, 0xbe, 0xef]])).map(|h| h.to_string()),
            Some("0xdeadbeef".to_string())
        );
    }

    #[test]
    fn packs_flat_byte_arrays() {
        assert_eq!(
            to_hex(&json!([1, 2, 255])).map(|h| h.to_string()),
            Some("0x0102ff".to_string())
        );
        // A single byte is not a nesting level.
        assert_eq!(
            to_hex(&json!([7])).map(|h| h.to_string()),
            Some("0x07".to_string())
        );
    }

    #[test]
    fn accepts_hex_strings() {
        assert_eq!(
            to_hex(&json!("0xABCD")).map(|h| h.to_string()),
            Some("0xabcd".to_string())
        );
        let bare = "11".repeat(32);
        assert_eq!(
            to_hex(&json!(bare)).map(|h| h.to_string()),
            Some(format!("0x{bare}"))
        );
    }

    #[test]
    fn unrecognized_shapes_yield_none() {
        for value in [
            json!(null),
            json!(true),
            json!(12345),
            json!({ "id": [1, 2] }),
            json!("not hex"),
            json!("abcd"),
            json!([256]),
            json!([-1]),
            json!([1.5]),
            json!(["0x01"]),
            json!([[1], [2]]),
            json!([[[1]]]),
        ] {
            assert_eq!(to_hex(&value), None, "{value}");
        }
    }

    #[test]
    fn normalize_fields_rewrites_only_byte_fields() {
        let fields = json!({
            "from": [[1, 2]],
            "to": "0xAA",
            "amount": 10,
        });
        let fields = fields.as_object().expect("object");
        let normalized = normalize_fields(fields);
        assert_eq!(normalized["from"], json!("0x0102"));
        assert_eq!(normalized["to"], json!("0xaa"));
        assert_eq!(normalized["amount"], json!(10));
    }
}
