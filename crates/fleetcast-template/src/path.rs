//! Dotted-path traversal and mutation over a workflow's JSON tree.
//!
//! Paths are plain strings like `"4.inputs.ckpt_name"`, traversed left to
//! right; segments separated by `.` are matched literally against JSON
//! object keys. Writing through a missing intermediate segment creates an
//! object at that position. Any segment that names a language-internal
//! object representation ("prototype-like") is refused outright as a
//! security invariant.

use serde_json::{Map, Value};

use crate::error::TemplateError;

/// Segment names that would let a write reach into an internal object
/// representation if this were running on a host with JS-style prototypal
/// objects. Rust's `serde_json::Map` has no such footgun at runtime, but the
/// invariant is a *data*-level contract (the backend receiving this JSON
/// tree may itself be interpreted by a JS-ish templating layer downstream),
/// so it is enforced here regardless of the host language's own semantics.
const RESERVED_SEGMENTS: &[&str] = &["__proto__", "prototype", "constructor"];

/// Split a dotted path into its segments, rejecting any segment that is
/// empty or reserved.
pub fn parse_path(path: &str) -> Result<Vec<&str>, TemplateError> {
    let segments: Vec<&str> = path.split('.').collect();
    for segment in &segments {
        if segment.is_empty() {
            return Err(TemplateError::InvalidPath(path.to_string()));
        }
        if RESERVED_SEGMENTS.contains(segment) {
            return Err(TemplateError::InvalidPath(path.to_string()));
        }
    }
    Ok(segments)
}

/// Read the value at `path` within `root`, if present.
pub fn get<'a>(root: &'a Value, path: &str) -> Result<Option<&'a Value>, TemplateError> {
    let segments = parse_path(path)?;
    let mut current = root;
    for segment in segments {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Write `value` at `path` within `root`, creating missing intermediate
/// objects. Fails with [`TemplateError::InvalidPath`] if any segment is
/// reserved, or if an existing intermediate value is not an object (it
/// cannot be safely descended into without destroying data).
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<(), TemplateError> {
    let segments = parse_path(path)?;
    let (last, parents) = segments.split_last().expect("parse_path never returns empty");

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            return Err(TemplateError::InvalidPath(path.to_string()));
        }
        let map = current.as_object_mut().unwrap();
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        return Err(TemplateError::InvalidPath(path.to_string()));
    }
    current
        .as_object_mut()
        .unwrap()
        .insert(last.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_missing_intermediates() {
        let mut root = json!({});
        set(&mut root, "4.inputs.ckpt_name", json!("v1.safetensors")).unwrap();
        assert_eq!(root, json!({"4": {"inputs": {"ckpt_name": "v1.safetensors"}}}));
    }

    #[test]
    fn set_overwrites_only_the_named_leaf() {
        let mut root = json!({"4": {"inputs": {"other": 1, "ckpt_name": "old"}}});
        set(&mut root, "4.inputs.ckpt_name", json!("new")).unwrap();
        assert_eq!(root, json!({"4": {"inputs": {"other": 1, "ckpt_name": "new"}}}));
    }

    #[test]
    fn get_returns_none_for_missing_path() {
        let root = json!({"4": {"inputs": {}}});
        assert_eq!(get(&root, "4.inputs.missing").unwrap(), None);
    }

    #[test]
    fn rejects_prototype_segment() {
        let mut root = json!({});
        let err = set(&mut root, "4.__proto__.polluted", json!(true)).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidPath(_)));
        // Must leave the tree completely unchanged.
        assert_eq!(root, json!({}));
    }

    #[test]
    fn rejects_constructor_segment_anywhere_in_the_path() {
        let mut root = json!({"4": {}});
        let err = set(&mut root, "4.constructor", json!(1)).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidPath(_)));
    }

    #[test]
    fn rejects_empty_segment() {
        let mut root = json!({});
        let err = set(&mut root, "4..ckpt_name", json!(1)).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidPath(_)));
    }

    #[test]
    fn refuses_to_descend_through_a_scalar() {
        let mut root = json!({"4": {"inputs": 5}});
        let err = set(&mut root, "4.inputs.ckpt_name", json!("x")).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidPath(_)));
    }
}
