//! Breakdown file parsing and schema validation.
//!
//! A breakdown file is a JSON object whose keys are string-encoded
//! non-negative line thresholds and whose values are [`BreakdownSegment`]s.
//! Key `"0"` is mandatory.

use crate::model::{BreakdownMap, BreakdownSegment};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakdownError {
    #[error("breakdown file is not valid JSON: {0}")]
    Syntax(String),
    #[error("breakdown file must be a JSON object keyed by line number")]
    NotAnObject,
    #[error("breakdown file is missing the required initial segment \"0\"")]
    MissingInitialSegment,
    #[error("breakdown key {0:?} is not a non-negative line number")]
    InvalidKey(String),
    #[error("breakdown segment {key} is malformed: {reason}")]
    InvalidSegment { key: u32, reason: String },
}

impl BreakdownError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "breakdown-syntax",
            Self::NotAnObject => "breakdown-not-object",
            Self::MissingInitialSegment => "breakdown-missing-initial",
            Self::InvalidKey(_) => "breakdown-invalid-key",
            Self::InvalidSegment { .. } => "breakdown-invalid-segment",
        }
    }
}

pub fn parse_breakdown(text: &str) -> Result<BreakdownMap, BreakdownError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| BreakdownError::Syntax(err.to_string()))?;
    validate_breakdown(value)
}

pub fn validate_breakdown(value: Value) -> Result<BreakdownMap, BreakdownError> {
    let Value::Object(entries) = value else {
        return Err(BreakdownError::NotAnObject);
    };

    let mut segments = BTreeMap::new();
    for (raw_key, raw_segment) in entries {
        let key = parse_line_key(&raw_key)?;
        let segment = serde_json::from_value::<BreakdownSegment>(raw_segment).map_err(|err| {
            BreakdownError::InvalidSegment {
                key,
                reason: err.to_string(),
            }
        })?;
        segments.insert(key, segment);
    }

    if !segments.contains_key(&0) {
        return Err(BreakdownError::MissingInitialSegment);
    }

    Ok(BreakdownMap::from_validated(segments))
}

// "07" and "7" would collide after parsing, so only canonical decimal is accepted.
fn parse_line_key(raw: &str) -> Result<u32, BreakdownError> {
    let canonical = !raw.is_empty()
        && raw.bytes().all(|byte| byte.is_ascii_digit())
        && (raw == "0" || !raw.starts_with('0'));
    if !canonical {
        return Err(BreakdownError::InvalidKey(raw.to_string()));
    }
    raw.parse::<u32>()
        .map_err(|_| BreakdownError::InvalidKey(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sparse_keys() {
        let map = parse_breakdown(
            r##"{
                "0": {"color": "#f07167", "markdown": ["intro"], "image": ["cover"], "mBelow": true},
                "1": {"color": "#cecaaf"},
                "12": {"markdown": ["a", "b"]}
            }"##,
        )
        .expect("valid breakdown");

        assert_eq!(map.keys().collect::<Vec<_>>(), vec![0, 1, 12]);
        assert_eq!(
            map.get(0).and_then(|segment| segment.color.as_deref()),
            Some("#f07167")
        );
        assert_eq!(map.get(12).map(|s| s.markdown_blocks().len()), Some(2));
    }

    #[test]
    fn rejects_missing_zero() {
        let err = parse_breakdown(r#"{"1": {"color": "red"}}"#).expect_err("no key 0");
        assert_eq!(err, BreakdownError::MissingInitialSegment);
        assert_eq!(err.code(), "breakdown-missing-initial");
    }

    #[test]
    fn rejects_non_numeric_and_negative_keys() {
        for key in ["intro", "-1", "1.5", "", "01"] {
            let text = format!(r#"{{"0": {{}}, "{key}": {{}}}}"#);
            let err = parse_breakdown(&text).expect_err("bad key");
            assert_eq!(err.code(), "breakdown-invalid-key", "key {key:?}");
        }
    }

    #[test]
    fn rejects_malformed_segments() {
        let wrong_type = parse_breakdown(r#"{"0": {"markdown": "not a list"}}"#).expect_err("bad");
        assert!(matches!(
            wrong_type,
            BreakdownError::InvalidSegment { key: 0, .. }
        ));

        let unknown = parse_breakdown(r#"{"0": {"colour": "red"}}"#).expect_err("bad");
        assert_eq!(unknown.code(), "breakdown-invalid-segment");

        let scalar = parse_breakdown(r#"{"0": 5}"#).expect_err("bad");
        assert_eq!(scalar.code(), "breakdown-invalid-segment");
    }

    #[test]
    fn rejects_non_objects_and_bad_json() {
        assert_eq!(
            parse_breakdown("[1, 2]").expect_err("array"),
            BreakdownError::NotAnObject
        );
        assert_eq!(
            parse_breakdown("{").expect_err("truncated").code(),
            "breakdown-syntax"
        );
    }
}
