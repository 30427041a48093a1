//! Dotted-path addressing into nested JSON documents.
//!
//! A path like `"profile.ssn"` is an ordered sequence of segment tokens.
//! Each segment indexes an object by key, or an array by numeric position.
//! Lookup distinguishes a *missing* path (skipped by callers) from a *type
//! mismatch* (a segment applied to a scalar, or a non-numeric segment applied
//! to an array), which is an error.

use serde_json::Value;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PathError {
    #[error("segment {segment:?} applied to a non-container value")]
    NotAContainer { segment: String },
    #[error("segment {segment:?} is not a valid array index")]
    BadArrayIndex { segment: String },
}

/// An ordered sequence of segment tokens addressing a field in a nested
/// document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dotted path. Every `.`-separated token becomes one segment;
    /// parsing never fails (segments are validated against the document at
    /// lookup time).
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolves the path against `doc`.
    ///
    /// Returns `Ok(None)` when the path is absent (missing object key or
    /// out-of-bounds array index), and `Err` on a type mismatch.
    pub fn lookup<'a>(&self, doc: &'a Value) -> Result<Option<&'a Value>, PathError> {
        let mut current = doc;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => match map.get(segment) {
                    Some(v) => v,
                    None => return Ok(None),
                },
                Value::Array(items) => {
                    let index = parse_index(segment)?;
                    match items.get(index) {
                        Some(v) => v,
                        None => return Ok(None),
                    }
                }
                _ => {
                    return Err(PathError::NotAContainer {
                        segment: segment.clone(),
                    })
                }
            };
        }
        Ok(Some(current))
    }

    /// Mutable variant of [`lookup`](Self::lookup), used to replace a field
    /// value in place. Paths are never created; absent paths stay absent.
    pub fn lookup_mut<'a>(&self, doc: &'a mut Value) -> Result<Option<&'a mut Value>, PathError> {
        let mut current = doc;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => match map.get_mut(segment) {
                    Some(v) => v,
                    None => return Ok(None),
                },
                Value::Array(items) => {
                    let index = parse_index(segment)?;
                    match items.get_mut(index) {
                        Some(v) => v,
                        None => return Ok(None),
                    }
                }
                _ => {
                    return Err(PathError::NotAContainer {
                        segment: segment.clone(),
                    })
                }
            };
        }
        Ok(Some(current))
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

fn parse_index(segment: &str) -> Result<usize, PathError> {
    segment.parse().map_err(|_| PathError::BadArrayIndex {
        segment: segment.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_top_level_key() {
        let doc = json!({"ssn": "123-45-6789"});
        let path = FieldPath::parse("ssn");
        assert_eq!(path.lookup(&doc).unwrap(), Some(&json!("123-45-6789")));
    }

    #[test]
    fn test_lookup_nested_key() {
        let doc = json!({"profile": {"ssn": "123-45-6789"}});
        let path = FieldPath::parse("profile.ssn");
        assert_eq!(path.lookup(&doc).unwrap(), Some(&json!("123-45-6789")));
    }

    #[test]
    fn test_lookup_array_index() {
        let doc = json!({"emails": ["a@b.com", "c@d.com"]});
        let path = FieldPath::parse("emails.1");
        assert_eq!(path.lookup(&doc).unwrap(), Some(&json!("c@d.com")));
    }

    #[test]
    fn test_missing_key_is_none() {
        let doc = json!({"profile": {}});
        let path = FieldPath::parse("profile.ssn");
        assert_eq!(path.lookup(&doc).unwrap(), None);
    }

    #[test]
    fn test_out_of_bounds_index_is_none() {
        let doc = json!({"emails": ["a@b.com"]});
        let path = FieldPath::parse("emails.5");
        assert_eq!(path.lookup(&doc).unwrap(), None);
    }

    #[test]
    fn test_segment_into_scalar_is_error() {
        let doc = json!({"ssn": "123-45-6789"});
        let path = FieldPath::parse("ssn.digits");
        assert!(matches!(
            path.lookup(&doc),
            Err(PathError::NotAContainer { .. })
        ));
    }

    #[test]
    fn test_non_numeric_array_segment_is_error() {
        let doc = json!({"emails": ["a@b.com"]});
        let path = FieldPath::parse("emails.first");
        assert!(matches!(
            path.lookup(&doc),
            Err(PathError::BadArrayIndex { .. })
        ));
    }

    #[test]
    fn test_lookup_mut_replaces_in_place() {
        let mut doc = json!({"profile": {"ssn": "123-45-6789"}});
        let path = FieldPath::parse("profile.ssn");
        *path.lookup_mut(&mut doc).unwrap().unwrap() = json!("redacted");
        assert_eq!(doc, json!({"profile": {"ssn": "redacted"}}));
    }

    #[test]
    fn test_display_round_trips() {
        let path = FieldPath::parse("a.b.0.c");
        assert_eq!(path.to_string(), "a.b.0.c");
    }
}
