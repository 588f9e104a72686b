//! JSON Pointer lookup for `$ref` fragments

use percent_encoding::percent_decode_str;
use serde_json::Value;

/// Look up a `$ref` fragment (the part after `#`) in `document`.
///
/// The fragment may be percent-encoded and may omit its leading `/`
/// (`#definitions/A`). An empty fragment selects the whole document. Numeric
/// segments index arrays; `~1` and `~0` unescape to `/` and `~`.
pub fn resolve_fragment<'a>(document: &'a Value, fragment: &str) -> Option<&'a Value> {
    let decoded = percent_decode_str(fragment).decode_utf8_lossy();
    let pointer = decoded.as_ref();
    if pointer.is_empty() || pointer == "/" {
        return Some(document);
    }
    if pointer.starts_with('/') {
        document.pointer(pointer)
    } else {
        document.pointer(&format!("/{}", pointer))
    }
}

/// Split a `$ref` into its document part and optional fragment
pub fn split_ref(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('#') {
        Some((file, fragment)) => (file, Some(fragment)),
        None => (reference, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolves_nested_and_array_segments() {
        let doc = json!({"$defs": {"A": {"oneOf": [{"type": "string"}, {"type": "null"}]}}});
        assert_eq!(
            resolve_fragment(&doc, "/$defs/A/oneOf/1"),
            Some(&json!({"type": "null"}))
        );
    }

    #[test]
    fn test_empty_fragment_is_whole_document() {
        let doc = json!({"type": "string"});
        assert_eq!(resolve_fragment(&doc, ""), Some(&doc));
        assert_eq!(resolve_fragment(&doc, "/"), Some(&doc));
    }

    #[test]
    fn test_escaped_and_encoded_segments() {
        let doc = json!({"definitions": {"a/b": {"type": "integer"}, "c d": {"type": "number"}}});
        assert_eq!(resolve_fragment(&doc, "/definitions/a~1b"), Some(&json!({"type": "integer"})));
        assert_eq!(resolve_fragment(&doc, "/definitions/c%20d"), Some(&json!({"type": "number"})));
        assert_eq!(resolve_fragment(&doc, "definitions/c%20d"), Some(&json!({"type": "number"})));
    }

    #[test]
    fn test_missing_segment() {
        let doc = json!({"definitions": {}});
        assert_eq!(resolve_fragment(&doc, "/definitions/Missing"), None);
        assert_eq!(resolve_fragment(&doc, "/definitions/0/x"), None);
    }

    #[test]
    fn test_split_ref() {
        assert_eq!(split_ref("common.json#/defs/A"), ("common.json", Some("/defs/A")));
        assert_eq!(split_ref("common.json"), ("common.json", None));
        assert_eq!(split_ref("#/defs/A"), ("", Some("/defs/A")));
    }
}
