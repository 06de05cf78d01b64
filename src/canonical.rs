use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};

use crate::error::Result;

/// BLAKE3 digest of a record's compact canonical rendering.
///
/// Two records with the same data but different key order or formatting
/// digest identically. Dedup drops any record whose digest was already seen,
/// so a digest collision would silently drop a distinct record; with a
/// 256-bit digest that risk is accepted as negligible.
pub type ContentDigest = [u8; 32];

/// Renders a record in canonical form: keys sorted lexicographically,
/// indented with `indent` spaces, UTF-8, `\n` newlines.
///
/// Key ordering comes from `serde_json::Map` being a BTreeMap; the rendering
/// is deterministic for equal data regardless of how the value was built.
pub fn to_canonical_string(record: &Value, indent: usize) -> Result<String> {
    let pad = vec![b' '; indent];
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(&pad);
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    record.serialize(&mut ser)?;
    Ok(String::from_utf8(buf).expect("serde_json emits valid UTF-8"))
}

/// Content digest over the compact canonical rendering, so dedup identity
/// does not depend on the configured indent.
pub fn content_digest(record: &Value) -> ContentDigest {
    *blake3::hash(record.to_string().as_bytes()).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_sorts_keys() {
        let value: Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        let text = to_canonical_string(&value, 4).unwrap();
        assert_eq!(text, "{\n    \"a\": 1,\n    \"b\": 2\n}");
    }

    #[test]
    fn test_canonical_indent_width() {
        let value = json!({"x": [1, 2]});
        let text = to_canonical_string(&value, 2).unwrap();
        assert_eq!(text, "{\n  \"x\": [\n    1,\n    2\n  ]\n}");
    }

    #[test]
    fn test_digest_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        assert_eq!(content_digest(&a), content_digest(&b));
    }

    #[test]
    fn test_digest_ignores_indent() {
        let value = json!({"a": 1});
        assert_eq!(content_digest(&value), content_digest(&value.clone()));
        let reparsed: Value =
            serde_json::from_str(&to_canonical_string(&value, 8).unwrap()).unwrap();
        assert_eq!(content_digest(&value), content_digest(&reparsed));
    }

    #[test]
    fn test_digest_distinguishes_values() {
        assert_ne!(content_digest(&json!({"a": 1})), content_digest(&json!({"a": 2})));
        assert_ne!(content_digest(&json!(1)), content_digest(&json!("1")));
    }
}
