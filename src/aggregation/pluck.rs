//! Dot-delimited field lookup
//!
//! Resolves a path such as `"data.state"` against a nested field mapping.
//! A path resolves only when every intermediate segment is a nested mapping
//! and the final segment is a scalar; anything else is `Missing`.

use crate::types::{FieldValue, Fields, Scalar};

/// Outcome of a field lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Plucked<'a> {
    /// The path resolved to a scalar
    Scalar(&'a Scalar),
    /// Some segment was absent, or the walk hit the wrong kind of value
    Missing,
}

impl<'a> Plucked<'a> {
    /// Convert to an `Option`
    pub fn scalar(self) -> Option<&'a Scalar> {
        match self {
            Plucked::Scalar(s) => Some(s),
            Plucked::Missing => None,
        }
    }

    /// True if the lookup failed
    pub fn is_missing(&self) -> bool {
        matches!(self, Plucked::Missing)
    }
}

/// Resolve `path` against `fields`
pub fn pluck<'a>(fields: &'a Fields, path: &str) -> Plucked<'a> {
    let mut segments = path.split('.');
    let first = match segments.next() {
        Some(segment) => segment,
        None => return Plucked::Missing,
    };

    match fields.get(first) {
        Some(value) => walk(value, segments),
        None => Plucked::Missing,
    }
}

fn walk<'a, 'p>(value: &'a FieldValue, mut rest: impl Iterator<Item = &'p str>) -> Plucked<'a> {
    match (value, rest.next()) {
        (FieldValue::Scalar(s), None) => Plucked::Scalar(s),
        (FieldValue::Nested(_), None) => Plucked::Missing,
        (FieldValue::Scalar(_), Some(_)) => Plucked::Missing,
        (FieldValue::Nested(inner), Some(segment)) => match inner.get(segment) {
            Some(next) => walk(next, rest),
            None => Plucked::Missing,
        },
    }
}

/// Check that a path is usable as a decomposition field
///
/// Rejects empty paths and empty segments (`"a..b"`, `".a"`, `"a."`).
pub fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("field path cannot be empty".to_string());
    }
    if path.split('.').any(str::is_empty) {
        return Err(format!("field path '{}' has an empty segment", path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Datapoint;

    fn nested_point() -> Datapoint {
        let mut data = Fields::new();
        data.insert("state".to_string(), FieldValue::from("MA"));
        data.insert("city".to_string(), FieldValue::from("Boston"));
        Datapoint::new(1.0)
            .with_field("data", data)
            .with_field("state", "MA")
            .with_field("util", 83.0)
    }

    #[test]
    fn test_flat_lookup() {
        let point = nested_point();
        assert_eq!(pluck(&point.fields, "util"), Plucked::Scalar(&Scalar::Number(83.0)));
    }

    #[test]
    fn test_nested_lookup_matches_flat() {
        let point = nested_point();
        assert_eq!(pluck(&point.fields, "data.state"), pluck(&point.fields, "state"));
    }

    #[test]
    fn test_missing_segments() {
        let point = nested_point();
        assert!(pluck(&point.fields, "host").is_missing());
        assert!(pluck(&point.fields, "data.zip").is_missing());
        // scalar where a mapping was expected
        assert!(pluck(&point.fields, "util.low").is_missing());
        // mapping where a scalar was expected
        assert!(pluck(&point.fields, "data").is_missing());
    }

    #[test]
    fn test_deep_nesting() {
        let mut c = Fields::new();
        c.insert("d".to_string(), FieldValue::from(4.0));
        let mut b = Fields::new();
        b.insert("c".to_string(), FieldValue::from(c));
        let point = Datapoint::new(1.0).with_field("b", b);

        assert_eq!(
            pluck(&point.fields, "b.c.d").scalar(),
            Some(&Scalar::Number(4.0))
        );
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("state").is_ok());
        assert!(validate_path("data.state").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("a..b").is_err());
        assert!(validate_path(".a").is_err());
        assert!(validate_path("a.").is_err());
    }
}
