//! Outbound request construction
//!
//! Builds self-contained [`OutboundRequest`]s: verb and URL checked, bearer
//! token and standard headers attached, body carried verbatim. Nothing here
//! touches the network.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::Serialize;
use url::form_urlencoded;
use url::Url;

use crate::{Error, Result};

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A fully-formed request, consumed by exactly one gateway execution
#[derive(Clone, PartialEq)]
pub struct OutboundRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl OutboundRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Per-request deadline, overriding the gateway's request timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Bound this request by its own deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Turn into a reqwest request on `client`
    pub(crate) fn into_reqwest(
        self,
        client: &reqwest::Client,
    ) -> std::result::Result<reqwest::Request, reqwest::Error> {
        let mut builder = client.request(self.method, self.url).headers(self.headers);
        if let Some(body) = self.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}

impl fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &crate::http::trace::sanitize_headers(&self.headers))
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for outbound requests; holds the headers common to every request
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    user_agent: HeaderValue,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            user_agent: HeaderValue::from_str(&default_user_agent())
                .unwrap_or_else(|_| HeaderValue::from_static("cfnet")),
        }
    }
}

impl RequestBuilder {
    /// Create a builder sending `user_agent`
    pub fn new(user_agent: &str) -> Result<Self> {
        let user_agent = HeaderValue::from_str(user_agent).map_err(|e| Error::InvalidRequest {
            message: format!("Invalid user agent: {user_agent}"),
            source: Some(Box::new(e)),
        })?;
        Ok(Self { user_agent })
    }

    /// Build a request.
    ///
    /// An empty `token` sends no credentials. `body` is sent verbatim as JSON.
    pub fn build_request(
        &self,
        method: &str,
        url: &str,
        token: &str,
        body: Option<Vec<u8>>,
    ) -> Result<OutboundRequest> {
        let method = parse_method(method)?;
        let url = parse_url(url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert(USER_AGENT, self.user_agent.clone());

        if !token.is_empty() {
            headers.insert(AUTHORIZATION, bearer_header(token)?);
        }

        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }

        Ok(OutboundRequest {
            method,
            url,
            headers,
            body,
            timeout: None,
        })
    }

    /// Build a request whose body is `body` serialized as JSON
    pub fn build_json_request<T: Serialize + ?Sized>(
        &self,
        method: &str,
        url: &str,
        token: &str,
        body: &T,
    ) -> Result<OutboundRequest> {
        let body = serde_json::to_vec(body)?;
        self.build_request(method, url, token, Some(body))
    }

    /// Build a request whose body is `params` form-encoded
    pub fn build_form_request(
        &self,
        method: &str,
        url: &str,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<OutboundRequest> {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        let mut request = self.build_request(method, url, token, Some(body.into_bytes()))?;
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        Ok(request)
    }
}

/// Default `User-Agent` value
pub fn default_user_agent() -> String {
    format!(
        "cfnet/{} ({}; {})",
        crate::VERSION,
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Parse HTTP method from string
fn parse_method(method_str: &str) -> Result<Method> {
    match method_str.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "HEAD" => Ok(Method::HEAD),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        "OPTIONS" => Ok(Method::OPTIONS),
        _ => Err(Error::invalid_request(format!(
            "Unsupported HTTP method: {method_str}"
        ))),
    }
}

/// Parse an absolute http(s) URL
fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidRequest {
        message: format!("Invalid URL: {url}"),
        source: Some(Box::new(e)),
    })?;

    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(parsed),
        _ => Err(Error::invalid_request(format!(
            "URL must be an absolute http or https URL: {url}"
        ))),
    }
}

/// Tokens from the credential store already carry their scheme; bare tokens
/// get one.
fn bearer_header(token: &str) -> Result<HeaderValue> {
    let has_scheme = token
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer "));
    let value = if has_scheme {
        token.to_string()
    } else {
        format!("Bearer {token}")
    };

    let mut header = HeaderValue::from_str(&value).map_err(|e| Error::InvalidRequest {
        message: "Token contains characters not allowed in a header".to_string(),
        source: Some(Box::new(e)),
    })?;
    header.set_sensitive(true);
    Ok(header)
}
