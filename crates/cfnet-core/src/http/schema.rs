//! Error body schemas of the supported backing services
//!
//! Each backing service reports failures with its own JSON shape. A gateway is
//! bound to exactly one [`ErrorSchema`] and decodes every non-2xx body with it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cloud Controller code reserved for an invalid or expired auth token
pub const CC_INVALID_TOKEN_CODE: i64 = 1000;
/// Cloud Controller `error_code` reserved for an invalid or expired auth token
pub const CC_INVALID_TOKEN_ERROR_CODE: &str = "CF-InvalidAuthToken";
/// UAA `error` value reserved for an invalid or expired auth token
pub const UAA_INVALID_TOKEN_ERROR: &str = "invalid_token";
/// Routing API `name` value reserved for an invalid or expired auth token
pub const ROUTING_API_INVALID_TOKEN_NAME: &str = "UnauthorizedError";

/// Backing service whose error payload shape a gateway understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSchema {
    /// `{"code": 10000, "description": "...", "error_code": "CF-..."}`
    CloudController,
    /// `{"error": "invalid_token", "error_description": "..."}`
    Uaa,
    /// `{"name": "UnauthorizedError", "message": "..."}`
    RoutingApi,
}

/// An error body decoded under a schema, already normalized
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedError {
    /// Service-specific error code
    pub code: String,
    /// Human-readable message as sent by the service
    pub message: String,
    /// Whether the body carries the service's invalid-token signature
    pub invalid_token: bool,
    /// The full JSON body
    pub details: Value,
}

#[derive(Debug, Deserialize)]
struct CloudControllerBody {
    code: i64,
    description: String,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UaaBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoutingApiBody {
    name: String,
    message: String,
}

impl ErrorSchema {
    /// Human-readable name of the backing service
    pub fn service_name(&self) -> &'static str {
        match self {
            ErrorSchema::CloudController => "Cloud Controller",
            ErrorSchema::Uaa => "UAA",
            ErrorSchema::RoutingApi => "Routing API",
        }
    }

    /// Decode a raw error body.
    ///
    /// Returns `None` when the body is not JSON or lacks the fields this
    /// schema requires; the caller turns that into a parse failure.
    pub fn decode(&self, body: &[u8]) -> Option<DecodedError> {
        let details: Value = serde_json::from_slice(body).ok()?;

        match self {
            ErrorSchema::CloudController => {
                let parsed = CloudControllerBody::deserialize(&details).ok()?;
                let invalid_token = parsed.code == CC_INVALID_TOKEN_CODE
                    || parsed.error_code.as_deref() == Some(CC_INVALID_TOKEN_ERROR_CODE);
                Some(DecodedError {
                    code: parsed.code.to_string(),
                    message: parsed.description,
                    invalid_token,
                    details,
                })
            }
            ErrorSchema::Uaa => {
                let parsed = UaaBody::deserialize(&details).ok()?;
                let invalid_token = parsed.error == UAA_INVALID_TOKEN_ERROR;
                let message = parsed
                    .error_description
                    .unwrap_or_else(|| parsed.error.clone());
                Some(DecodedError {
                    code: parsed.error,
                    message,
                    invalid_token,
                    details,
                })
            }
            ErrorSchema::RoutingApi => {
                let parsed = RoutingApiBody::deserialize(&details).ok()?;
                let invalid_token = parsed.name == ROUTING_API_INVALID_TOKEN_NAME;
                Some(DecodedError {
                    code: parsed.name,
                    message: parsed.message,
                    invalid_token,
                    details,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_api_decoding() {
        let body = br#"{ "name": "some-error", "message": "The host is taken: test1" }"#;
        let decoded = ErrorSchema::RoutingApi.decode(body).unwrap();

        assert_eq!(decoded.code, "some-error");
        assert_eq!(decoded.message, "The host is taken: test1");
        assert!(!decoded.invalid_token);
    }

    #[test]
    fn test_routing_api_invalid_token_signature() {
        let body = br#"{"name":"UnauthorizedError","message":"bad token!"}"#;
        let decoded = ErrorSchema::RoutingApi.decode(body).unwrap();
        assert!(decoded.invalid_token);
    }

    #[test]
    fn test_cloud_controller_decoding() {
        let body = br#"{"code": 210003, "description": "The host is taken: my-app", "error_code": "CF-RouteHostTaken"}"#;
        let decoded = ErrorSchema::CloudController.decode(body).unwrap();

        assert_eq!(decoded.code, "210003");
        assert_eq!(decoded.message, "The host is taken: my-app");
        assert!(!decoded.invalid_token);
        assert_eq!(decoded.details["error_code"], "CF-RouteHostTaken");
    }

    #[test]
    fn test_cloud_controller_invalid_token_signatures() {
        let by_code = br#"{"code": 1000, "description": "Invalid Auth Token"}"#;
        assert!(ErrorSchema::CloudController.decode(by_code).unwrap().invalid_token);

        let by_error_code =
            br#"{"code": 10002, "description": "Invalid Auth Token", "error_code": "CF-InvalidAuthToken"}"#;
        assert!(ErrorSchema::CloudController.decode(by_error_code).unwrap().invalid_token);
    }

    #[test]
    fn test_uaa_decoding() {
        let body = br#"{"error":"invalid_token","error_description":"Invalid access token: expired"}"#;
        let decoded = ErrorSchema::Uaa.decode(body).unwrap();

        assert_eq!(decoded.code, "invalid_token");
        assert_eq!(decoded.message, "Invalid access token: expired");
        assert!(decoded.invalid_token);

        // description is optional, error is not
        let decoded = ErrorSchema::Uaa.decode(br#"{"error":"unauthorized"}"#).unwrap();
        assert_eq!(decoded.message, "unauthorized");
        assert!(ErrorSchema::Uaa.decode(br#"{"error_description":"x"}"#).is_none());
    }

    #[test]
    fn test_schema_mismatch_is_not_decoded() {
        // Routing API shape under the Cloud Controller schema
        let body = br#"{"name":"some-error","message":"nope"}"#;
        assert!(ErrorSchema::CloudController.decode(body).is_none());

        // Mistyped field
        let body = br#"{"code":"abc","description":"nope"}"#;
        assert!(ErrorSchema::CloudController.decode(body).is_none());
    }

    #[test]
    fn test_non_json_is_not_decoded() {
        let body = "¯\\_(ツ)_/¯\n".as_bytes();
        assert!(ErrorSchema::RoutingApi.decode(body).is_none());
        assert!(ErrorSchema::Uaa.decode(b"").is_none());
    }

    #[test]
    fn test_schema_serde_names() {
        let schema: ErrorSchema = serde_json::from_str("\"routing_api\"").unwrap();
        assert_eq!(schema, ErrorSchema::RoutingApi);
        assert_eq!(ErrorSchema::Uaa.service_name(), "UAA");
    }
}
