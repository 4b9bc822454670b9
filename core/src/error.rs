//! Error types for the request adapter.
//!
//! # Design
//! Two families live here. `ErrorKind` / `ErrorInfo` are *data*: they are
//! carried inside a failed `ResultEnvelope` and never returned through
//! `Result::Err`. `TransportError` and `ConfigError` are ordinary Rust errors
//! for the few places where the library itself can fail before a request
//! exists (building a client, reading configuration) or where a transport
//! reports why a request did not complete.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The server rejected the payload and listed per-field problems.
    ValidationError,

    /// The server reported a failure with a message but no field errors.
    ServerError,

    /// The request never produced a usable response.
    NetworkError,

    /// The transport or server rejected the caller's credentials.
    AuthenticationError,

    /// Any outcome the other kinds do not describe.
    UnknownError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ValidationError => "validation error",
            ErrorKind::ServerError => "server error",
            ErrorKind::NetworkError => "network error",
            ErrorKind::AuthenticationError => "authentication error",
            ErrorKind::UnknownError => "unknown error",
        };
        f.write_str(name)
    }
}

/// A classified failure, as delivered to callers inside a `ResultEnvelope`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// Server-provided structure such as field-level validation errors.
    /// `Value::Null` when the response carried none.
    #[serde(default)]
    pub details: Value,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn has_details(&self) -> bool {
        !self.details.is_null()
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// Why a transport could not complete a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    ConnectionRefused,
    Timeout,
    Tls,
    /// The transport itself signalled an authentication failure, e.g. a
    /// proxy or server demanding credentials it could not supply.
    Authentication,
    Other,
}

/// A transport-level failure with the transport's own description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_authentication(&self) -> bool {
        self.kind == TransportErrorKind::Authentication
    }
}

/// Errors raised while loading `AdapterConfig` or building a transport.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_info_display_includes_kind_and_message() {
        let info = ErrorInfo::new(ErrorKind::ServerError, "Internal failure");
        assert_eq!(info.to_string(), "server error: Internal failure");
    }

    #[test]
    fn error_info_defaults_to_null_details() {
        let info = ErrorInfo::new(ErrorKind::NetworkError, "connection refused");
        assert!(!info.has_details());

        let info = info.with_details(serde_json::json!({"name": ["required"]}));
        assert!(info.has_details());
    }

    #[test]
    fn error_info_deserializes_without_details() {
        let info: ErrorInfo =
            serde_json::from_str(r#"{"kind":"ServerError","message":"boom"}"#).unwrap();
        assert_eq!(info.kind, ErrorKind::ServerError);
        assert!(info.details.is_null());
    }

    #[test]
    fn transport_error_displays_transport_text() {
        let err = TransportError::new(TransportErrorKind::ConnectionRefused, "Connection refused");
        assert_eq!(err.to_string(), "Connection refused");
        assert!(!err.is_authentication());
    }
}
