//! Structured payload extraction from free-form model output.
//!
//! A model reply is a prose report optionally followed by a JSON object. The
//! object is located with an ordered list of [`PayloadStrategy`]s; the first
//! strategy that matches wins. Parsing never fails: a reply without a
//! decodable payload becomes [`ParsedResponse::ReportOnly`].
//!
//! All patterns are compiled by the `regex` crate, whose matching is linear
//! in the input length, so a pathological reply cannot trigger a runaway scan.
//! A reply that echoes a delimiter in prose can still produce a false match;
//! first match wins.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static TAG_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<json>\s*(\{.*?\})\s*</json>").expect("valid regex"));

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex"));

static FLAT_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("valid regex"));

/// How to find the payload inside a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadStrategy {
    /// `<json>{...}</json>`
    TagPair,
    /// A fenced code block, optionally labelled `json`.
    Fenced,
    /// The first `{...}` without nested braces.
    FirstFlatObject,
}

impl PayloadStrategy {
    fn pattern(&self) -> &'static Regex {
        match self {
            Self::TagPair => &TAG_PAIR,
            Self::Fenced => &FENCED,
            Self::FirstFlatObject => &FLAT_OBJECT,
        }
    }

    /// Byte offset where the match starts and the captured object text.
    fn locate<'a>(&self, raw: &'a str) -> Option<(usize, &'a str)> {
        let caps = self.pattern().captures(raw)?;
        let whole = caps.get(0)?;
        let object = caps.get(1).unwrap_or(whole);
        Some((whole.start(), object.as_str()))
    }
}

/// Result of parsing one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// A payload was found and decoded.
    Structured { report: String, payload: Payload },
    /// No usable payload. Holds the report text.
    ReportOnly(String),
}

impl ParsedResponse {
    pub fn report(&self) -> &str {
        match self {
            Self::Structured { report, .. } => report,
            Self::ReportOnly(report) => report,
        }
    }

    /// The decoded payload, if any.
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Structured { payload, .. } => Some(payload),
            Self::ReportOnly(_) => None,
        }
    }
}

/// Parse `raw` with `strategies`, in order.
pub fn parse_response(raw: &str, strategies: &[PayloadStrategy]) -> ParsedResponse {
    let Some((start, object)) = strategies.iter().find_map(|s| s.locate(raw)) else {
        return ParsedResponse::ReportOnly(clean_report(raw));
    };

    let mut report = clean_report(&raw[..start]);
    match serde_json::from_str::<Value>(object) {
        Ok(Value::Object(map)) => ParsedResponse::Structured {
            report,
            payload: Payload(map),
        },
        Ok(_) | Err(_) => {
            tracing::debug!(len = raw.len(), "undecodable payload, keeping report only");
            if report.is_empty() {
                report = clean_report(raw);
            }
            ParsedResponse::ReportOnly(report)
        }
    }
}

/// Trim and drop a trailing `---` separator.
fn clean_report(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_suffix("---")
        .map(str::trim_end)
        .unwrap_or(trimmed)
        .to_string()
}

// ---------------------------------------------------------------------------
// Payload field access
// ---------------------------------------------------------------------------

/// A decoded JSON object with null-safe field accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Text field. `null`, empty and `unknown` (any case) are `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) => clean_text(s),
            other => clean_text(&other.to_string()),
        }
    }

    /// List field, JSON-encoded. Empty lists are `None`; a bare string is
    /// treated as a one-element list.
    pub fn list(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Array(items) if items.is_empty() => None,
            Value::Array(items) => serde_json::to_string(items).ok(),
            Value::String(s) => {
                let s = clean_text(s)?;
                serde_json::to_string(&[s]).ok()
            }
            _ => None,
        }
    }

    /// Integer field, accepting numbers and numeric strings.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
            Value::String(s) => {
                let s = clean_text(s)?;
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
            }
            _ => None,
        }
    }

    /// Year field. Out-of-range values are `None`.
    pub fn year(&self, key: &str) -> Option<i32> {
        self.int(key).and_then(|y| i32::try_from(y).ok())
    }

    /// Boolean field, accepting `true`/`false` and `yes`/`no` strings.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

fn clean_text(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("unknown") || s.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PayloadStrategy::*;

    #[test]
    fn fenced_payload_splits_report() {
        let raw = "## Acme\nStrong team.\n\n---\n```json\n{\"industry\": \"SaaS\", \"stage\": \"Unknown\"}\n```";
        let parsed = parse_response(raw, &[Fenced]);
        assert_eq!(parsed.report(), "## Acme\nStrong team.");
        let payload = parsed.payload().expect("structured");
        assert_eq!(payload.text("industry").as_deref(), Some("SaaS"));
        assert_eq!(payload.text("stage"), None);
    }

    #[test]
    fn tag_pair_wins_over_fence() {
        let raw = "memo <json>{\"a\": \"tag\"}</json> ```json\n{\"a\": \"fence\"}\n```";
        let parsed = parse_response(raw, &[TagPair, Fenced]);
        assert_eq!(parsed.payload().unwrap().text("a").as_deref(), Some("tag"));
        assert_eq!(parsed.report(), "memo");
    }

    #[test]
    fn falls_back_to_later_strategy() {
        let raw = "memo\n```json\n{\"a\": 1}\n```";
        let parsed = parse_response(raw, &[TagPair, Fenced]);
        assert_eq!(parsed.payload().unwrap().int("a"), Some(1));
    }

    #[test]
    fn missing_delimiter_is_report_only() {
        let parsed = parse_response("  just prose  ", &[TagPair, Fenced]);
        assert_eq!(parsed, ParsedResponse::ReportOnly("just prose".into()));
    }

    #[test]
    fn truncated_payload_is_report_only() {
        let raw = "memo text\n```json\n{\"industry\": \"SaaS\", \"stage\": }\n```";
        let parsed = parse_response(raw, &[Fenced]);
        assert!(parsed.payload().is_none());
        assert_eq!(parsed.report(), "memo text");
    }

    #[test]
    fn malformed_payload_without_prose_keeps_whole_text() {
        let raw = "```json\n{\"a\": [1,}\n```";
        let parsed = parse_response(raw, &[Fenced]);
        assert!(parsed.payload().is_none());
        assert!(!parsed.report().is_empty());
    }

    #[test]
    fn first_flat_object() {
        let raw = "Sure! {\"guest_name\": \"Ann\", \"is_founder\": true} done";
        let parsed = parse_response(raw, &[FirstFlatObject]);
        let payload = parsed.payload().unwrap();
        assert_eq!(payload.text("guest_name").as_deref(), Some("Ann"));
        assert_eq!(payload.flag("is_founder"), Some(true));
    }

    #[test]
    fn sanitizers_are_lenient() {
        let raw = r#"```json
{"tech": ["Rust", "Go"], "none": [], "one": "Python", "year": "2019",
 "bad_year": "circa 2019", "score": 7.0, "name": "UNKNOWN", "amount": 1500000}
```"#;
        let parsed = parse_response(raw, &[Fenced]);
        let p = parsed.payload().unwrap();
        assert_eq!(p.list("tech").as_deref(), Some(r#"["Rust","Go"]"#));
        assert_eq!(p.list("none"), None);
        assert_eq!(p.list("one").as_deref(), Some(r#"["Python"]"#));
        assert_eq!(p.year("year"), Some(2019));
        assert_eq!(p.year("bad_year"), None);
        assert_eq!(p.int("score"), Some(7));
        assert_eq!(p.text("name"), None);
        assert_eq!(p.text("amount").as_deref(), Some("1500000"));
        assert_eq!(p.text("absent"), None);
    }
}
