//! HTTP gateway for backing-service communication
//!
//! This module provides:
//! - Request building with bearer tokens and standard headers
//! - TLS trust configuration with operator-supplied CA certificates
//! - Per-service error schemas and classification into one error taxonomy
//! - A single refresh-and-retry protocol for invalid tokens
//! - Redacted request/response tracing

pub mod auth;
pub mod builder;
pub mod client;
pub mod error;
pub mod schema;
pub mod timeout;
pub mod tls;
pub mod trace;

pub use auth::{AuthAttempt, AuthRetry, AuthRetryDecision, TokenSource};
pub use builder::{OutboundRequest, RequestBuilder};
pub use client::{Gateway, RawResponse, WARNINGS_HEADER};
pub use error::{ErrorKind, HttpError, TransportCause, PARSE_FAILURE_STATUS};
pub use schema::ErrorSchema;
pub use timeout::TimeoutConfig;
pub use tls::{TlsConfig, TlsConfigError, TrustStore, TrustedCertificate};
pub use trace::{TraceSink, TracingSink};

// Re-export commonly used types
pub use reqwest::{Method, StatusCode};
