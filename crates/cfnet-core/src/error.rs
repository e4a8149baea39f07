//! Error types for the cfnet core library
//!
//! `Error` is the crate-wide error. Failures that come back from a backing
//! service are carried as a classified [`HttpError`](crate::http::HttpError)
//! inside [`Error::Gateway`], so callers can match on the kind without
//! unwrapping strings.

use thiserror::Error;

use crate::http::{HttpError, TlsConfigError};

/// Main error type for cfnet operations
#[derive(Error, Debug)]
pub enum Error {
    /// Outbound request could not be constructed (bad verb, bad URL, bad header)
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Classified failure returned by the gateway
    #[error(transparent)]
    Gateway(#[from] HttpError),

    /// Trust store could not be applied
    #[error(transparent)]
    Tls(#[from] TlsConfigError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Credential source failed to produce or refresh a token
    #[error("Token refresh failed: {message}")]
    TokenRefresh {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a request construction error without an underlying cause
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::InvalidRequest {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error without an underlying cause
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// The classified gateway failure, if this is one
    pub fn as_http_error(&self) -> Option<&HttpError> {
        match self {
            Error::Gateway(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
