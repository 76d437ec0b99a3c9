//! Error types for Cirrus.
//!
//! [`ClientError`] is the single failure type produced by the pipeline, the
//! client façade, paging and transfers. Its variants follow the failure
//! taxonomy callers need to branch on:
//!
//! | Variant     | Meaning                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `Client`    | request could not be built; never sent over the wire      |
//! | `Service`   | response status outside the allowed set                   |
//! | `Decoding`  | allowed status, but the body is not in the expected shape |
//! | `Transport` | the transport failed before producing a response          |
//! | `Cancelled` | the cancellation token fired; distinct from failure       |

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using [`ClientError`].
pub type ClientResult<T> = Result<T, ClientError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed request construction.
    Client,
    /// Disallowed response status.
    Service,
    /// Undecodable response body.
    Decoding,
    /// Transport-level failure.
    Transport,
    /// Cancelled or timed out.
    Cancelled,
}

/// Classification of transport failures.
///
/// Resumable transfers pause instead of failing on the transient kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// No network connection is available.
    NotConnected,
    /// The connection dropped mid-request.
    ConnectionLost,
    /// The transport gave up waiting for the server.
    TimedOut,
    /// Anything else.
    Other,
}

impl TransportErrorKind {
    /// Returns true for failures that a later attempt may not hit.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectionLost | Self::TimedOut)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotConnected => "not connected",
            Self::ConnectionLost => "connection lost",
            Self::TimedOut => "timed out",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Standard error type for Cirrus.
///
/// # Example
///
/// ```
/// use cirrus_core::{ClientError, ErrorCategory};
///
/// let error = ClientError::service(404, None);
/// assert_eq!(error.category(), ErrorCategory::Service);
/// assert_eq!(error.to_string(), "Service returned invalid status code [404].");
/// ```
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request could not be constructed.
    #[error("Client error: {message}")]
    Client {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The service answered with a status outside the allowed set.
    #[error("{message}")]
    Service {
        /// HTTP status code returned.
        status: u16,
        /// Human-readable error message, including the body when available.
        message: String,
        /// The response body parsed as JSON, when it parsed.
        body: Option<serde_json::Value>,
    },

    /// The response body could not be decoded.
    #[error("Decoding error: {message}")]
    Decoding {
        /// Human-readable error message.
        message: String,
        /// The underlying parse failure.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The transport failed.
    #[error("Transport error ({kind}): {message}")]
    Transport {
        /// Failure classification.
        kind: TransportErrorKind,
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The operation was cancelled or timed out.
    #[error("Cancelled: {message}")]
    Cancelled {
        /// Human-readable error message.
        message: String,
    },
}

impl ClientError {
    /// Creates a client error.
    #[must_use]
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a client error with a source error.
    pub fn client_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Client {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a service error for a disallowed status.
    ///
    /// The message is `Service returned invalid status code [N].`, followed
    /// by the compact JSON body when one is supplied.
    #[must_use]
    pub fn service(status: u16, body: Option<serde_json::Value>) -> Self {
        let mut message = format!("Service returned invalid status code [{status}].");
        if let Some(body) = &body {
            message.push(' ');
            message.push_str(&body.to_string());
        }
        Self::Service {
            status,
            message,
            body,
        }
    }

    /// Creates a service error from a raw response body.
    ///
    /// The body is parsed as JSON on a best-effort basis; an unparseable
    /// body is dropped from the message.
    #[must_use]
    pub fn service_from_body(status: u16, body: &[u8]) -> Self {
        let parsed = if body.is_empty() {
            None
        } else {
            serde_json::from_slice(body).ok()
        };
        Self::service(status, parsed)
    }

    /// Creates a decoding error.
    #[must_use]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a decoding error with a source error.
    pub fn decoding_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Decoding {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error with a source error.
    pub fn transport_with_source(
        kind: TransportErrorKind,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Client { .. } => ErrorCategory::Client,
            Self::Service { .. } => ErrorCategory::Service,
            Self::Decoding { .. } => ErrorCategory::Decoding,
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Returns the HTTP status of a service error.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the transport failure kind, if this is a transport error.
    #[must_use]
    pub const fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true for transport failures that may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        Self::decoding_with_source("JSON decoding failed", error)
    }
}

impl From<http::Error> for ClientError {
    fn from(error: http::Error) -> Self {
        Self::client_with_source("invalid HTTP request", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_error_message_includes_body() {
        let error = ClientError::service(404, Some(json!({"error": "missing"})));
        assert_eq!(error.category(), ErrorCategory::Service);
        assert_eq!(error.status_code(), Some(404));
        assert_eq!(
            error.to_string(),
            r#"Service returned invalid status code [404]. {"error":"missing"}"#
        );
    }

    #[test]
    fn test_service_from_unparseable_body() {
        let error = ClientError::service_from_body(500, b"<html>oops</html>");
        assert_eq!(error.to_string(), "Service returned invalid status code [500].");
        match error {
            ClientError::Service { body, .. } => assert!(body.is_none()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_transient_transport_kinds() {
        assert!(TransportErrorKind::ConnectionLost.is_transient());
        assert!(TransportErrorKind::TimedOut.is_transient());
        assert!(TransportErrorKind::NotConnected.is_transient());
        assert!(!TransportErrorKind::Other.is_transient());

        let error = ClientError::transport(TransportErrorKind::TimedOut, "slow");
        assert!(error.is_transient());
        assert_eq!(error.transport_kind(), Some(TransportErrorKind::TimedOut));
        assert!(!ClientError::client("bad").is_transient());
    }

    #[test]
    fn test_cancellation_is_distinct() {
        let error = ClientError::cancelled("token fired");
        assert!(error.is_cancelled());
        assert_eq!(error.category(), ErrorCategory::Cancelled);
        assert!(error.status_code().is_none());
    }

    #[test]
    fn test_from_serde_json_is_decoding() {
        let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: ClientError = parse_error.into();
        assert_eq!(error.category(), ErrorCategory::Decoding);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&ErrorCategory::Transport).unwrap();
        assert_eq!(json, r#""transport""#);
    }
}
