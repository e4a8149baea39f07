//! Request/response tracing
//!
//! Each exchange is reported to a [`TraceSink`]. Records are redacted before
//! they reach the sink: bearer tokens, refresh tokens and passwords never
//! leave the gateway.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, AUTHORIZATION};

/// Replacement text for redacted values
pub const PRIVATE_DATA_PLACEHOLDER: &str = "[PRIVATE DATA HIDDEN]";

static JSON_SECRET: OnceLock<Regex> = OnceLock::new();
static FORM_SECRET: OnceLock<Regex> = OnceLock::new();

/// Outbound half of an exchange
#[derive(Debug, Clone)]
pub struct RequestTrace {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Inbound half of an exchange
#[derive(Debug, Clone)]
pub struct ResponseTrace {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Receiver of request/response records
pub trait TraceSink: Send + Sync {
    /// Whether records are wanted at all; when false the gateway skips
    /// building and redacting them
    fn enabled(&self) -> bool {
        true
    }

    fn request(&self, trace: &RequestTrace);

    fn response(&self, trace: &ResponseTrace);
}

/// Default sink: emits `tracing` debug events on the `cfnet::trace` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn enabled(&self) -> bool {
        tracing::enabled!(target: "cfnet::trace", tracing::Level::DEBUG)
    }

    fn request(&self, trace: &RequestTrace) {
        tracing::debug!(
            target: "cfnet::trace",
            method = %trace.method,
            url = %trace.url,
            headers = ?trace.headers,
            body = trace.body.as_deref().unwrap_or_default(),
            sent_at = %trace.sent_at.to_rfc3339(),
            "REQUEST"
        );
    }

    fn response(&self, trace: &ResponseTrace) {
        tracing::debug!(
            target: "cfnet::trace",
            method = %trace.method,
            url = %trace.url,
            status = trace.status,
            headers = ?trace.headers,
            body = %trace.body,
            elapsed_ms = trace.elapsed.as_millis() as u64,
            "RESPONSE"
        );
    }
}

/// Header list with credentials masked
pub fn sanitize_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if *name == AUTHORIZATION || value.is_sensitive() {
                PRIVATE_DATA_PLACEHOLDER.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

/// Body text with secret JSON fields and form parameters masked
pub fn sanitize_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);

    let json = JSON_SECRET.get_or_init(|| {
        Regex::new(r#""(access_token|refresh_token|token|password)"\s*:\s*"[^"]*""#)
            .expect("Valid regex pattern")
    });
    let form = FORM_SECRET.get_or_init(|| {
        Regex::new(r"\b(access_token|refresh_token|password)=[^&\s]*").expect("Valid regex pattern")
    });

    let text = json.replace_all(&text, format!(r#""$1":"{PRIVATE_DATA_PLACEHOLDER}""#).as_str());
    form.replace_all(&text, format!("$1={PRIVATE_DATA_PLACEHOLDER}").as_str())
        .into_owned()
}
