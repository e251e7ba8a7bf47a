//! Uniform query result shared by both backends

use serde::Serialize;

use crate::{Error, Result};

/// Reply shown when a command ran but printed nothing
pub const NO_OUTPUT_REPLY: &str = "Command executed, no response.";

/// Result of a console query
///
/// A caller never needs to know which backend produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The console answered with non-blank text (kept verbatim)
    Value(String),
    /// The console answered with nothing or only whitespace
    NoOutput,
    /// The query failed
    Error(Error),
}

/// Normalize a raw console response
///
/// `None` and all-whitespace text become [`QueryOutcome::NoOutput`];
/// anything else is returned untrimmed as [`QueryOutcome::Value`].
pub fn normalize(raw: Option<String>) -> QueryOutcome {
    match raw {
        Some(text) if !text.trim().is_empty() => QueryOutcome::Value(text),
        _ => QueryOutcome::NoOutput,
    }
}

impl QueryOutcome {
    /// Collapse a fallible raw response into an outcome
    pub fn from_result(result: Result<Option<String>>) -> Self {
        match result {
            Ok(raw) => normalize(raw),
            Err(e) => QueryOutcome::Error(e),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryOutcome::Error(_))
    }

    /// The error, if this outcome is one
    pub fn error(&self) -> Option<&Error> {
        match self {
            QueryOutcome::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Text shown to the operator
    pub fn render(&self) -> String {
        match self {
            QueryOutcome::Value(text) => text.clone(),
            QueryOutcome::NoOutput => NO_OUTPUT_REPLY.to_string(),
            QueryOutcome::Error(e) => format!("Error [{}]: {}", e.kind(), e),
        }
    }
}

impl From<Error> for QueryOutcome {
    fn from(err: Error) -> Self {
        QueryOutcome::Error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_none() {
        assert_eq!(normalize(None), QueryOutcome::NoOutput);
    }

    #[test]
    fn test_normalize_blank() {
        for blank in ["", " ", "\n", " \t\r\n "] {
            assert_eq!(normalize(Some(blank.to_string())), QueryOutcome::NoOutput);
        }
    }

    #[test]
    fn test_normalize_keeps_raw_text() {
        let raw = "  There are 0 of a max 20 players online\n";
        assert_eq!(
            normalize(Some(raw.to_string())),
            QueryOutcome::Value(raw.to_string())
        );
    }

    #[test]
    fn test_from_result() {
        assert_eq!(
            QueryOutcome::from_result(Ok(Some("OK".into()))),
            QueryOutcome::Value("OK".into())
        );
        let outcome = QueryOutcome::from_result(Err(Error::Timeout("slow".into())));
        assert!(outcome.is_error());
    }

    #[test]
    fn test_render() {
        assert_eq!(QueryOutcome::Value("hi".into()).render(), "hi");
        assert_eq!(QueryOutcome::NoOutput.render(), NO_OUTPUT_REPLY);
        let rendered = QueryOutcome::Error(Error::NotInitialized("no client".into())).render();
        assert_eq!(
            rendered,
            "Error [not_initialized]: Client is not initialized: no client"
        );
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(QueryOutcome::Value("OK".into())).unwrap();
        assert_eq!(json["status"], "value");
        assert_eq!(json["result"], "OK");

        let json = serde_json::to_value(QueryOutcome::NoOutput).unwrap();
        assert_eq!(json["status"], "no_output");
    }
}
