//! Error types

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Stable tag identifying the category of an [`Error`]
///
/// Callers match on the kind instead of the message, so the tag is the
/// same no matter which backend produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BackendDown,
    Timeout,
    ConnectionRefused,
    AuthenticationFailed,
    NotInitialized,
    Unexpected,
}

impl ErrorKind {
    /// Tag as rendered in replies and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackendDown => "backend_down",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Error {
    #[error("Embedded console is not running: {0}")]
    BackendDown(String),

    #[error("Console did not answer in time: {0}")]
    Timeout(String),

    #[error("Connection refused by {addr}: {reason}")]
    ConnectionRefused { addr: String, reason: String },

    #[error("Authentication failed for {addr}")]
    AuthenticationFailed { addr: String },

    #[error("Client is not initialized: {0}")]
    NotInitialized(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Create a connection refused error
    pub fn connection_refused(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionRefused {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Create an authentication failed error
    pub fn authentication_failed(addr: impl Into<String>) -> Self {
        Self::AuthenticationFailed { addr: addr.into() }
    }

    /// Wrap any displayable cause as [`Error::Unexpected`]
    pub fn unexpected(cause: impl fmt::Display) -> Self {
        Self::Unexpected(cause.to_string())
    }

    /// Stable category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BackendDown(_) => ErrorKind::BackendDown,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            Error::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            Error::NotInitialized(_) => ErrorKind::NotInitialized,
            Error::ConfigError(_) | Error::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

// Host collaborators report failures through anyhow; keep the whole chain.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Unexpected(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(Error::BackendDown("x".into()).kind(), ErrorKind::BackendDown);
        assert_eq!(Error::Timeout("x".into()).kind(), ErrorKind::Timeout);
        assert_eq!(
            Error::connection_refused("127.0.0.1:25575", "refused").kind(),
            ErrorKind::ConnectionRefused
        );
        assert_eq!(
            Error::authentication_failed("127.0.0.1:25575").kind(),
            ErrorKind::AuthenticationFailed
        );
        assert_eq!(
            Error::NotInitialized("x".into()).kind(),
            ErrorKind::NotInitialized
        );
        assert_eq!(Error::ConfigError("x".into()).kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn test_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("socket closed").context("query failed");
        let converted: Error = err.into();
        assert_eq!(
            converted,
            Error::Unexpected("query failed: socket closed".to_string())
        );
    }

    #[test]
    fn test_serialize_adjacent_tag() {
        let json = serde_json::to_value(Error::authentication_failed("host:1")).unwrap();
        assert_eq!(json["kind"], "authentication_failed");
        assert_eq!(json["detail"]["addr"], "host:1");
    }
}
