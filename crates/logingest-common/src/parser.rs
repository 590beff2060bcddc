//! Log line parser
//!
//! Recognises the one supported line grammar:
//!
//! ```text
//! [<timestamp>] <LEVEL> <message> [{"optional": "json payload"}]
//! ```
//!
//! Parsing never fails on malformed input: a line either yields a
//! [`ParsedLine`] or `None`. A trailing `{...}` blob that is not valid JSON
//! still yields the line, without a payload.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// `[timestamp] LEVEL message` with an optional whitespace-separated JSON object at the end.
pub const LINE_PATTERN: &str = r"^\[([^\]]+)\]\s+([A-Za-z0-9_]+)\s+(.+?)(?:\s+(\{.*\}))?$";

/// Structured fields captured from one log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedLine {
    /// Raw bracketed timestamp text
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub payload: Option<serde_json::Value>,
}

/// Compiled line grammar
#[derive(Debug, Clone)]
pub struct LineParser {
    pattern: Regex,
}

impl LineParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(LINE_PATTERN)?,
        })
    }

    /// Parse one line; `None` when it does not match the grammar.
    pub fn parse(&self, line: &str) -> Option<ParsedLine> {
        let caps = self.pattern.captures(line)?;

        let timestamp = caps.get(1)?.as_str().to_string();
        let level = caps.get(2)?.as_str().to_string();
        let message = caps.get(3)?.as_str().to_string();

        let payload = caps.get(4).and_then(|blob| {
            match serde_json::from_str::<serde_json::Value>(blob.as_str()) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(payload = blob.as_str(), error = %e, "Failed to parse JSON payload");
                    None
                },
            }
        });

        Some(ParsedLine {
            timestamp,
            level,
            message,
            payload,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> LineParser {
        LineParser::new().unwrap()
    }

    #[test]
    fn test_parse_plain_line() {
        let line = parser().parse("[2024-01-01T00:00:00Z] INFO hello").unwrap();

        assert_eq!(line.timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(line.level, "INFO");
        assert_eq!(line.message, "hello");
        assert!(line.payload.is_none());
    }

    #[test]
    fn test_parse_line_with_payload() {
        let line = parser()
            .parse(r#"[2024-01-01T01:00:00Z] ERROR boom {"code":500}"#)
            .unwrap();

        assert_eq!(line.level, "ERROR");
        assert_eq!(line.message, "boom");
        assert_eq!(line.payload, Some(json!({"code": 500})));
    }

    #[test]
    fn test_parse_multi_word_message() {
        let line = parser()
            .parse("[12:00:01] WARN disk usage at 91% on /var")
            .unwrap();

        assert_eq!(line.timestamp, "12:00:01");
        assert_eq!(line.message, "disk usage at 91% on /var");
    }

    #[test]
    fn test_invalid_payload_is_dropped_not_fatal() {
        let line = parser()
            .parse("[2024-01-01T00:00:00Z] DEBUG cache miss {not json}")
            .unwrap();

        assert_eq!(line.message, "cache miss");
        assert!(line.payload.is_none());
    }

    #[test]
    fn test_nested_payload_preserved() {
        let line = parser()
            .parse(r#"[t] INFO request done {"user":{"id":7},"tags":["a","b"],"ok":true}"#)
            .unwrap();

        assert_eq!(
            line.payload,
            Some(json!({"user": {"id": 7}, "tags": ["a", "b"], "ok": true}))
        );
    }

    #[test]
    fn test_brace_without_separator_stays_in_message() {
        let line = parser().parse(r#"[t] INFO value={"a":1}"#).unwrap();

        assert_eq!(line.message, r#"value={"a":1}"#);
        assert!(line.payload.is_none());
    }

    #[test]
    fn test_non_matching_lines() {
        let p = parser();

        assert!(p.parse("not a log line").is_none());
        assert!(p.parse("").is_none());
        assert!(p.parse("   ").is_none());
        assert!(p.parse("[2024-01-01] INFO").is_none());
        assert!(p.parse("[] INFO hello").is_none());
        assert!(p.parse("[ts]INFO hello").is_none());
        assert!(p.parse("[ts] IN-FO hello").is_none());
    }
}
