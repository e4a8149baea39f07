//! Trust store behavior against a real TLS endpoint with a self-signed certificate

use std::sync::Arc;

use cfnet_core::{ErrorKind, Gateway, GatewayConfig, HttpError, TrustStore, TrustedCertificate};
use rcgen::{BasicConstraints, Certificate, CertificateParams, IsCa, KeyPair};
use rustls::ServerConfig;
use rustls_pki_types::PrivatePkcs8KeyDer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

const ROUTE_ERROR: &str = r#"{"name":"some-error","message":"The host is taken: test1"}"#;

struct SelfSigned {
    cert: Certificate,
    key: KeyPair,
}

impl SelfSigned {
    fn new(names: &[&str], is_ca: bool) -> Self {
        let mut params =
            CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
                .unwrap();
        if is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        }
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    /// `basicConstraints CA:TRUE`, like `openssl req -x509` produces
    fn ca() -> Self {
        Self::new(&["localhost", "127.0.0.1"], true)
    }

    fn leaf() -> Self {
        Self::new(&["localhost", "127.0.0.1"], false)
    }

    fn trusted(&self) -> Vec<TrustedCertificate> {
        TrustedCertificate::from_pem(self.cert.pem().as_bytes(), "server").unwrap()
    }
}

/// Serve a Routing API error over TLS; returns the URL to dial
async fn serve(identity: &SelfSigned) -> String {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![identity.cert.der().clone()],
            PrivatePkcs8KeyDer::from(identity.key.serialize_der()).into(),
        )
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut stream) = acceptor.accept(stream).await else {
                    return;
                };

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let response = format!(
                    "HTTP/1.1 400 Bad Request\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    ROUTE_ERROR.len(),
                    ROUTE_ERROR
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("https://127.0.0.1:{port}/routing/v1/routes")
}

async fn get(gateway: &Gateway, url: &str) -> HttpError {
    let request = gateway.new_request("GET", url, "TOKEN", None).unwrap();
    gateway.perform_request(request).await.unwrap_err()
}

fn assert_reached_server(error: &HttpError) {
    assert_eq!(error.kind, ErrorKind::RequestFailure, "{error}");
    assert_eq!(error.status_code, Some(400));
    assert_eq!(error.error_code(), "some-error");
}

fn assert_rejected(error: &HttpError) {
    assert_eq!(error.kind, ErrorKind::TransportFailure, "{error}");
    assert!(error.status_code.is_none());
}

#[tokio::test]
async fn test_self_signed_endpoint_rejected_by_default() {
    let identity = SelfSigned::ca();
    let url = serve(&identity).await;

    let gateway = Gateway::routing_api(GatewayConfig::default()).unwrap();
    assert_rejected(&get(&gateway, &url).await);
}

#[tokio::test]
async fn test_trusted_self_signed_ca_is_accepted() {
    let identity = SelfSigned::ca();
    let url = serve(&identity).await;

    let mut gateway = Gateway::routing_api(GatewayConfig::default()).unwrap();
    gateway.set_trusted_certificates(identity.trusted()).unwrap();

    assert_reached_server(&get(&gateway, &url).await);
}

#[tokio::test]
async fn test_trusted_self_signed_leaf_is_accepted() {
    let identity = SelfSigned::leaf();
    let url = serve(&identity).await;

    let mut gateway = Gateway::routing_api(GatewayConfig::default()).unwrap();
    assert_rejected(&get(&gateway, &url).await);

    gateway.set_trusted_certificates(identity.trusted()).unwrap();
    assert_reached_server(&get(&gateway, &url).await);
}

#[tokio::test]
async fn test_exclusive_trust_without_system_roots() {
    let identity = SelfSigned::ca();
    let url = serve(&identity).await;

    let mut gateway = Gateway::routing_api(GatewayConfig::default()).unwrap();
    gateway
        .set_trust_store(TrustStore::exclusive(identity.trusted()))
        .unwrap();
    assert_reached_server(&get(&gateway, &url).await);

    let mut config = GatewayConfig::default();
    config.tls.use_system_roots = false;
    config.tls.ca_cert_pem.push(identity.cert.pem());
    let gateway = Gateway::routing_api(config).unwrap();
    assert_reached_server(&get(&gateway, &url).await);
}

#[tokio::test]
async fn test_other_certificate_is_not_trusted() {
    let identity = SelfSigned::ca();
    let url = serve(&identity).await;

    let mut gateway = Gateway::routing_api(GatewayConfig::default()).unwrap();
    gateway
        .set_trusted_certificates(SelfSigned::ca().trusted())
        .unwrap();
    assert_rejected(&get(&gateway, &url).await);

    // trust is not sticky
    gateway.set_trusted_certificates(identity.trusted()).unwrap();
    assert_reached_server(&get(&gateway, &url).await);
    gateway.set_trusted_certificates(Vec::new()).unwrap();
    assert_rejected(&get(&gateway, &url).await);
}

#[tokio::test]
async fn test_trusted_certificate_must_match_host() {
    let identity = SelfSigned::new(&["api.example.com"], true);
    let url = serve(&identity).await;

    let mut gateway = Gateway::routing_api(GatewayConfig::default()).unwrap();
    gateway.set_trusted_certificates(identity.trusted()).unwrap();
    assert_rejected(&get(&gateway, &url).await);
}

#[tokio::test]
async fn test_skip_verification_only_when_asked() {
    let identity = SelfSigned::ca();
    let url = serve(&identity).await;

    let mut gateway = Gateway::routing_api(GatewayConfig::default()).unwrap();
    assert_rejected(&get(&gateway, &url).await);

    gateway
        .set_trust_store(TrustStore::skip_verification())
        .unwrap();
    assert_reached_server(&get(&gateway, &url).await);

    let mut config = GatewayConfig::default();
    config.tls.skip_ssl_validation = true;
    let gateway = Gateway::routing_api(config).unwrap();
    assert_reached_server(&get(&gateway, &url).await);
}
