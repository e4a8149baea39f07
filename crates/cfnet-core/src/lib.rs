//! cfnet Core - HTTP gateway for Cloud Foundry backing services
//!
//! Every repository talking to the Cloud Controller, the UAA or the Routing API
//! goes through a [`Gateway`]. The gateway builds authenticated requests, sends
//! them under an explicit TLS trust store, and turns every failed response into
//! a classified [`HttpError`], whatever error shape the service uses.
//!
//! # Main Components
//!
//! - **Trust Store**: operator-supplied CA certificates, system roots, explicit skip-verify
//! - **Request Builder**: verb and URL validation, bearer token, standard headers
//! - **Transport**: bounded by connect and request timeouts, traced with redaction
//! - **Error Classifier**: per-service [`ErrorSchema`], invalid-token detection
//! - **Auth Retry**: [`AuthRetry`] refreshes and resubmits exactly once
//!
//! # Example
//!
//! ```no_run
//! use cfnet_core::{ErrorKind, ErrorSchema, Gateway, GatewayConfig, Result};
//!
//! async fn delete_route(token: &str, guid: &str) -> Result<()> {
//!     let gateway = Gateway::new(ErrorSchema::CloudController, GatewayConfig::default())?;
//!     let url = format!("https://api.example.com/v2/routes/{guid}");
//!     let request = gateway.new_request("DELETE", &url, token, None)?;
//!
//!     match gateway.perform_request(request).await {
//!         Ok(_) => Ok(()),
//!         Err(e) if e.is_not_found() => Ok(()),
//!         Err(e) if e.kind == ErrorKind::InvalidToken => Err(e.into()),
//!         Err(e) => Err(e.into()),
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use http::{
    AuthAttempt, AuthRetry, AuthRetryDecision, ErrorKind, ErrorSchema, Gateway, HttpError,
    OutboundRequest, RawResponse, TimeoutConfig, TlsConfig, TokenSource, TraceSink,
    TrustStore, TrustedCertificate,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
