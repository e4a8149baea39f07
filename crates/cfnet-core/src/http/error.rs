//! HTTP error classification
//!
//! Turns a failed exchange with a backing service into a single structured
//! [`HttpError`], whatever error shape the service speaks.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::http::schema::ErrorSchema;

/// Status reported for responses whose body could not be interpreted
pub const PARSE_FAILURE_STATUS: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

/// Message reported for responses whose body could not be interpreted
pub const PARSE_FAILURE_MESSAGE: &str = "Unable to read the error response body from the server";

/// Kind of a gateway failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Non-2xx response with a body the configured schema understood
    RequestFailure,
    /// Authentication rejected; eligible for exactly one refreshed retry
    InvalidToken,
    /// Non-2xx response whose body could not be interpreted
    ParseFailure,
    /// No response was obtained at all
    TransportFailure,
}

impl ErrorKind {
    /// Whether a caller may refresh credentials and resubmit once
    pub fn is_auth_retryable(&self) -> bool {
        matches!(self, ErrorKind::InvalidToken)
    }

    /// Whether the failure happened before any response arrived.
    ///
    /// The gateway never retries these; this is a hint for caller policies.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::TransportFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RequestFailure => write!(f, "request failure"),
            ErrorKind::InvalidToken => write!(f, "invalid token"),
            ErrorKind::ParseFailure => write!(f, "parse failure"),
            ErrorKind::TransportFailure => write!(f, "transport failure"),
        }
    }
}

/// What went wrong below HTTP for a [`ErrorKind::TransportFailure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportCause {
    /// Deadline expired
    Timeout,
    /// DNS, refused connection, or TLS handshake failure
    Connect,
    /// Response started but the body could not be read
    Body,
    /// Anything else reported by the transport
    Other,
}

/// Structured error produced by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpError {
    /// Failure kind
    pub kind: ErrorKind,
    /// HTTP status; `None` only for transport failures
    pub status_code: Option<u16>,
    /// Service-specific error code, when the body carried one
    pub code: Option<String>,
    /// Human-readable error message
    pub message: String,
    /// Decoded error body
    pub details: Option<Value>,
    /// Transport cause for transport failures
    pub transport: Option<TransportCause>,
}

impl HttpError {
    /// Classify a non-2xx response body under `schema`.
    ///
    /// Decode first, check the invalid-token signature second, and report a
    /// parse failure only when the body could not be decoded.
    pub fn classify(schema: ErrorSchema, status: StatusCode, body: &[u8]) -> Self {
        let Some(decoded) = schema.decode(body) else {
            return Self::parse_failure(String::from_utf8_lossy(body).into_owned());
        };

        let kind = if status == StatusCode::UNAUTHORIZED && decoded.invalid_token {
            ErrorKind::InvalidToken
        } else {
            ErrorKind::RequestFailure
        };

        Self {
            kind,
            status_code: Some(status.as_u16()),
            code: Some(decoded.code),
            message: decoded.message,
            details: Some(decoded.details),
            transport: None,
        }
    }

    /// Error for a body that could not be interpreted; the raw text is kept
    /// in `details` for diagnostics.
    pub fn parse_failure(raw_body: String) -> Self {
        Self {
            kind: ErrorKind::ParseFailure,
            status_code: Some(PARSE_FAILURE_STATUS.as_u16()),
            code: None,
            message: PARSE_FAILURE_MESSAGE.to_string(),
            details: Some(Value::String(raw_body)),
            transport: None,
        }
    }

    /// Create from a network/request error
    pub fn from_request_error(error: reqwest::Error) -> Self {
        let cause = if error.is_timeout() {
            TransportCause::Timeout
        } else if error.is_connect() {
            TransportCause::Connect
        } else if error.is_body() || error.is_decode() {
            TransportCause::Body
        } else {
            TransportCause::Other
        };

        Self::transport(cause, error_chain(&error))
    }

    /// Transport failure with an explicit cause
    pub fn transport(cause: TransportCause, message: String) -> Self {
        Self {
            kind: ErrorKind::TransportFailure,
            status_code: None,
            code: None,
            message,
            details: None,
            transport: Some(cause),
        }
    }

    /// Whether this is a well-formed "resource absent" answer
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::RequestFailure
            && self.status_code == Some(StatusCode::NOT_FOUND.as_u16())
    }

    /// Whether this is the invalid-token classification
    pub fn is_invalid_token(&self) -> bool {
        self.kind == ErrorKind::InvalidToken
    }

    /// Service-specific error code, empty when the service sent none
    pub fn error_code(&self) -> &str {
        self.code.as_deref().unwrap_or_default()
    }
}

/// Flatten an error and its sources into one line; reqwest hides the useful
/// part (refused, certificate unknown) in the source chain.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status_code, &self.code) {
            (Some(status), Some(code)) => write!(
                f,
                "Server error, status code: {}, error code: {}, message: {}",
                status, code, self.message
            ),
            (Some(status), None) => {
                write!(f, "Server error, status code: {}, message: {}", status, self.message)
            }
            (None, _) => write!(f, "Error performing request: {}", self.message),
        }
    }
}

impl std::error::Error for HttpError {}
