//! Error types for the request coalescer

use std::fmt;
use std::io;

use serde_json::Value;
use thiserror::Error;

/// Result type alias for the request coalescer
pub type Result<T> = std::result::Result<T, Error>;

/// Request coalescer errors
#[derive(Error, Debug)]
pub enum Error {
    /// A normalized request failure, shared by every waiter of a fingerprint
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The payload could not be decoded into the caller's type
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A transport failure normalized into a single error shape.
///
/// This is what gets broadcast to waiters, so it must be cheap to clone.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// Structured failure response with a non-success status and a data message
    #[error("{0}")]
    Protocol(String),

    /// Structured failure response that does not match the protocol shape, surfaced unchanged
    #[error(transparent)]
    Transport(TransportFailure),

    /// No structured response at all (connection refused, timeout, ...)
    #[error("{0}")]
    Network(String),
}

/// Raw failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportFailure {
    /// Human-readable description of the failure
    pub message: String,
    /// Structured response, when the remote end answered at all
    pub response: Option<FailureResponse>,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.response {
            Some(response) => write!(f, "{} (status {})", self.message, response.status),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportFailure {}

impl TransportFailure {
    /// A failure where the remote answered with `status` and `body`
    pub fn with_response(message: impl Into<String>, status: u16, body: Value) -> Self {
        Self {
            message: message.into(),
            response: Some(FailureResponse { status, body }),
        }
    }

    /// A failure with no response (network-level)
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }
}

/// Response attached to a transport failure
#[derive(Debug, Clone, PartialEq)]
pub struct FailureResponse {
    /// HTTP status code of the response
    pub status: u16,
    /// Decoded response body, expected to follow the `{status, data}` envelope
    pub body: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn protocol_error_displays_bare_message() {
        let err: Error = RequestError::Protocol("bad input".to_string()).into();
        assert_eq!(err.to_string(), "bad input");
    }

    #[test]
    fn transport_failure_display_includes_status() {
        let failure = TransportFailure::with_response("Request failed", 502, json!("gateway"));
        assert_eq!(failure.to_string(), "Request failed (status 502)");
        assert_eq!(
            RequestError::Transport(failure.clone()).to_string(),
            failure.to_string()
        );
    }

    #[test]
    fn network_failure_has_no_response() {
        let failure = TransportFailure::network("connection refused");
        assert!(failure.response.is_none());
        assert_eq!(failure.to_string(), "connection refused");
    }
}
