//! Single refresh-and-retry after an invalid token
//!
//! The gateway only classifies; this module drives the retry. The protocol has
//! two states: the initial attempt, and one attempt with a refreshed token.
//! An invalid token on the refreshed attempt is final.

use async_trait::async_trait;

use crate::http::{Gateway, HttpError, OutboundRequest, RawResponse};
use crate::{Error, Result};

/// Source of bearer tokens, usually backed by the credential store
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Token to use for the next request
    async fn access_token(&self) -> Result<String>;

    /// Obtain a fresh token after the current one was rejected
    async fn refresh_token(&self) -> Result<String>;
}

/// Which attempt of the protocol is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAttempt {
    /// First attempt with the stored token
    Initial,
    /// Second and last attempt, after a refresh
    Refreshed,
}

/// What to do with the outcome of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRetryDecision {
    /// Refresh the token and run the `Refreshed` attempt
    RefreshAndRetry,
    /// Hand the outcome to the caller
    Finish,
}

impl AuthAttempt {
    /// Decide what follows an attempt that failed with `error`
    pub fn on_error(self, error: &HttpError) -> AuthRetryDecision {
        match self {
            AuthAttempt::Initial if error.kind.is_auth_retryable() => {
                AuthRetryDecision::RefreshAndRetry
            }
            _ => AuthRetryDecision::Finish,
        }
    }
}

/// Runs requests through a gateway with at most one token refresh
pub struct AuthRetry<'a> {
    gateway: &'a Gateway,
    tokens: &'a dyn TokenSource,
}

impl<'a> AuthRetry<'a> {
    pub fn new(gateway: &'a Gateway, tokens: &'a dyn TokenSource) -> Self {
        Self { gateway, tokens }
    }

    /// Run the request produced by `build`.
    ///
    /// `build` is called once per attempt with the token to use, so the
    /// retried attempt carries the refreshed token in a fresh request.
    pub async fn perform<F>(&self, mut build: F) -> Result<RawResponse>
    where
        F: FnMut(&Gateway, &str) -> Result<OutboundRequest>,
    {
        let mut attempt = AuthAttempt::Initial;
        let mut token = self.tokens.access_token().await?;

        loop {
            let request = build(self.gateway, &token)?;
            let error = match self.gateway.perform_request(request).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match attempt.on_error(&error) {
                AuthRetryDecision::RefreshAndRetry => {
                    tracing::warn!(
                        service = self.gateway.schema().service_name(),
                        "Token rejected, refreshing and retrying once"
                    );
                    token = self.tokens.refresh_token().await?;
                    attempt = AuthAttempt::Refreshed;
                }
                AuthRetryDecision::Finish => {
                    if attempt == AuthAttempt::Refreshed && error.is_invalid_token() {
                        tracing::warn!(
                            service = self.gateway.schema().service_name(),
                            "Refreshed token rejected, giving up"
                        );
                    }
                    return Err(Error::Gateway(error));
                }
            }
        }
    }
}
