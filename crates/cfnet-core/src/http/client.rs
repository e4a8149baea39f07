//! The gateway: one HTTP client per backing service
//!
//! A [`Gateway`] builds requests, sends them under its trust store and
//! timeouts, and classifies every non-2xx answer with the error schema of the
//! service it talks to.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::GatewayConfig;
use crate::http::trace::{sanitize_body, sanitize_headers, RequestTrace, ResponseTrace};
use crate::http::{
    ErrorSchema, HttpError, OutboundRequest, RequestBuilder, TimeoutConfig, TlsConfigError,
    TraceSink, TracingSink, TransportCause, TrustStore, TrustedCertificate,
};
use crate::Result;

/// Header carrying server-side warnings
pub const WARNINGS_HEADER: &str = "X-Cf-Warnings";

/// A response received from the backing service
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Body as UTF-8 text, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Warnings sent by the server alongside the response
    pub fn warnings(&self) -> Vec<String> {
        self.headers
            .get_all(WARNINGS_HEADER)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// HTTP gateway bound to one backing service
pub struct Gateway {
    client: ReqwestClient,
    schema: ErrorSchema,
    timeouts: TimeoutConfig,
    trust: TrustStore,
    request_builder: RequestBuilder,
    trace: Arc<dyn TraceSink>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("schema", &self.schema)
            .field("timeouts", &self.timeouts)
            .field("trust", &self.trust)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway for the service speaking `schema`.
    ///
    /// Trust material in `config` is loaded here; a bad certificate fails the
    /// construction.
    pub fn new(schema: ErrorSchema, config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let trust = TrustStore::from_config(&config.tls)?;
        let request_builder = match &config.user_agent {
            Some(user_agent) => RequestBuilder::new(user_agent)?,
            None => RequestBuilder::default(),
        };
        let client = build_client(&config.timeouts, &trust)?;

        Ok(Self {
            client,
            schema,
            timeouts: config.timeouts,
            trust,
            request_builder,
            trace: Arc::new(TracingSink),
        })
    }

    /// Create with default configuration
    pub fn with_default_config(schema: ErrorSchema) -> Result<Self> {
        Self::new(schema, GatewayConfig::default())
    }

    /// Gateway for the Cloud Controller API
    pub fn cloud_controller(config: GatewayConfig) -> Result<Self> {
        Self::new(ErrorSchema::CloudController, config)
    }

    /// Gateway for the UAA
    pub fn uaa(config: GatewayConfig) -> Result<Self> {
        Self::new(ErrorSchema::Uaa, config)
    }

    /// Gateway for the Routing API
    pub fn routing_api(config: GatewayConfig) -> Result<Self> {
        Self::new(ErrorSchema::RoutingApi, config)
    }

    /// Replace the trace sink
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = sink;
        self
    }

    /// Error schema this gateway classifies with
    pub fn schema(&self) -> ErrorSchema {
        self.schema
    }

    /// Current trust set
    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    /// Replace the trusted CA certificates; system roots stay trusted.
    ///
    /// Requires exclusive access, so it cannot race in-flight requests.
    pub fn set_trusted_certificates(
        &mut self,
        certificates: Vec<TrustedCertificate>,
    ) -> std::result::Result<(), TlsConfigError> {
        self.set_trust_store(TrustStore::with_certificates(certificates))
    }

    /// Replace the whole trust set
    pub fn set_trust_store(&mut self, trust: TrustStore) -> std::result::Result<(), TlsConfigError> {
        let client = build_client(&self.timeouts, &trust)?;
        tracing::info!(
            service = self.schema.service_name(),
            certificates = trust.certificates().len(),
            system_roots = trust.uses_system_roots(),
            skip_verification = trust.skips_verification(),
            "Trust store reconfigured"
        );
        self.client = client;
        self.trust = trust;
        Ok(())
    }

    /// Build a request. An empty `token` sends no credentials.
    pub fn new_request(
        &self,
        method: &str,
        url: &str,
        token: &str,
        body: Option<Vec<u8>>,
    ) -> Result<OutboundRequest> {
        self.request_builder.build_request(method, url, token, body)
    }

    /// Build a request with a JSON-serialized body
    pub fn new_json_request<T: Serialize + ?Sized>(
        &self,
        method: &str,
        url: &str,
        token: &str,
        body: &T,
    ) -> Result<OutboundRequest> {
        self.request_builder.build_json_request(method, url, token, body)
    }

    /// Build a request with a form-encoded body, as the UAA token endpoint
    /// expects
    pub fn new_form_request(
        &self,
        method: &str,
        url: &str,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<OutboundRequest> {
        self.request_builder.build_form_request(method, url, token, params)
    }

    /// Send `request`.
    ///
    /// 2xx responses come back untouched. Every other status is classified
    /// into an [`HttpError`]; failures before a full response arrived are
    /// transport failures. Nothing is retried here.
    pub async fn perform_request(
        &self,
        request: OutboundRequest,
    ) -> std::result::Result<RawResponse, HttpError> {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let tracing_enabled = self.trace.enabled();

        if tracing_enabled {
            self.trace.request(&RequestTrace {
                method: method.clone(),
                url: url.clone(),
                headers: sanitize_headers(request.headers()),
                body: request.body().map(sanitize_body),
                sent_at: Utc::now(),
            });
        }

        let started = Instant::now();
        let request = request
            .into_reqwest(&self.client)
            .map_err(|e| HttpError::transport(TransportCause::Other, e.to_string()))?;

        let response = self.client.execute(request).await.map_err(|e| {
            let error = HttpError::from_request_error(e);
            tracing::warn!(%method, %url, error = %error, "Request failed before a response arrived");
            error
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::transport(TransportCause::Body, e.to_string()))?
            .to_vec();

        if tracing_enabled {
            self.trace.response(&ResponseTrace {
                method: method.clone(),
                url: url.clone(),
                status: status.as_u16(),
                headers: sanitize_headers(&headers),
                body: sanitize_body(&body),
                received_at: Utc::now(),
                elapsed: started.elapsed(),
            });
        }

        if status.is_success() {
            return Ok(RawResponse {
                status,
                headers,
                body,
            });
        }

        let error = HttpError::classify(self.schema, status, &body);
        tracing::warn!(
            %method,
            %url,
            status = status.as_u16(),
            kind = %error.kind,
            code = error.error_code(),
            "{} request failed",
            self.schema.service_name()
        );
        Err(error)
    }

    /// Send `request` and decode a 2xx body as JSON
    pub async fn perform_request_for_json<T: DeserializeOwned>(
        &self,
        request: OutboundRequest,
    ) -> Result<(T, RawResponse)> {
        let response = self.perform_request(request).await?;
        let value = response.json()?;
        Ok((value, response))
    }
}

/// Create the underlying reqwest client for a trust set
fn build_client(
    timeouts: &TimeoutConfig,
    trust: &TrustStore,
) -> std::result::Result<ReqwestClient, TlsConfigError> {
    let builder = ReqwestClient::builder()
        .use_rustls_tls()
        .connect_timeout(timeouts.connect_timeout)
        .timeout(timeouts.request_timeout);

    trust
        .apply(builder)?
        .build()
        .map_err(|e| TlsConfigError::ClientBuild(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const TEST_CA: &str = include_str!("../../tests/fixtures/test-ca.pem");

    #[test]
    fn test_gateway_creation() {
        let gateway = Gateway::with_default_config(ErrorSchema::RoutingApi).unwrap();
        assert_eq!(gateway.schema(), ErrorSchema::RoutingApi);
        assert!(gateway.trust_store().certificates().is_empty());
        assert!(!gateway.trust_store().skips_verification());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = GatewayConfig::default();
        config.tls.ca_cert_pem.push("garbage".to_string());
        assert!(Gateway::uaa(config).is_err());
    }

    #[test]
    fn test_set_trusted_certificates() {
        let mut gateway = Gateway::cloud_controller(GatewayConfig::default()).unwrap();
        let certs = TrustedCertificate::from_pem(TEST_CA.as_bytes(), "fixture").unwrap();

        gateway.set_trusted_certificates(certs).unwrap();
        assert_eq!(gateway.trust_store().certificates().len(), 1);
        assert!(gateway.trust_store().uses_system_roots());

        gateway.set_trusted_certificates(Vec::new()).unwrap();
        assert!(gateway.trust_store().certificates().is_empty());
    }

    #[test]
    fn test_new_request_delegates_to_builder() {
        let gateway = Gateway::routing_api(GatewayConfig {
            user_agent: Some("cf/6.x".to_string()),
            ..GatewayConfig::default()
        })
        .unwrap();

        let request = gateway
            .new_request("GET", "https://api.example.com/routing/v1/routes", "TOKEN", None)
            .unwrap();
        assert_eq!(request.headers()["user-agent"], "cf/6.x");
        assert!(gateway.new_request("GET", "::", "TOKEN", None).is_err());
    }

    #[test]
    fn test_warnings() {
        let mut headers = HeaderMap::new();
        headers.insert(
            WARNINGS_HEADER,
            HeaderValue::from_static("first warning, second warning,"),
        );
        let response = RawResponse {
            status: StatusCode::OK,
            headers,
            body: Vec::new(),
        };
        assert_eq!(response.warnings(), vec!["first warning", "second warning"]);
    }

    #[test]
    fn test_gateway_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Gateway>();
    }
}
