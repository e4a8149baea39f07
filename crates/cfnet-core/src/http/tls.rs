//! TLS trust configuration for gateways
//!
//! A [`TrustStore`] is the ordered set of CA certificates one gateway trusts,
//! together with whether the system roots stay trusted and whether
//! verification is skipped outright. Skipping verification is only ever
//! enabled explicitly.
//!
//! A server presenting exactly one of the trusted certificates is accepted
//! even when that certificate is a self-signed CA, which plain chain
//! building rejects when it shows up as the end entity.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::ClientBuilder;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{verify_server_name, WebPkiServerVerifier};
use rustls::crypto::CryptoProvider;
use rustls::server::ParsedCertificate;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use serde::{Deserialize, Serialize};

/// TLS/HTTPS configuration as read from a config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// CA certificate files (PEM, bundles allowed)
    pub ca_cert_files: Vec<PathBuf>,
    /// Inline CA certificates (PEM, bundles allowed)
    pub ca_cert_pem: Vec<String>,
    /// Keep trusting the system roots in addition to the listed CAs
    pub use_system_roots: bool,
    /// Accept any server certificate (dangerous!)
    pub skip_ssl_validation: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_cert_files: Vec::new(),
            ca_cert_pem: Vec::new(),
            use_system_roots: true,
            skip_ssl_validation: false,
        }
    }
}

impl TlsConfig {
    /// Add a CA certificate file
    pub fn with_ca_cert_file(mut self, path: PathBuf) -> Self {
        self.ca_cert_files.push(path);
        self
    }

    /// Add inline CA certificate PEM content
    pub fn with_ca_cert_pem(mut self, pem_content: String) -> Self {
        self.ca_cert_pem.push(pem_content);
        self
    }

    /// Trust only the listed CAs
    pub fn without_system_roots(mut self) -> Self {
        self.use_system_roots = false;
        self
    }

    /// Validate the TLS configuration
    pub fn validate(&self) -> Result<(), TlsConfigError> {
        for ca_path in &self.ca_cert_files {
            if !ca_path.exists() {
                return Err(TlsConfigError::CaCertFileNotFound(ca_path.clone()));
            }
        }

        if !self.use_system_roots && !self.skip_ssl_validation && !self.has_custom_ca_certs() {
            return Err(TlsConfigError::NoTrustRoots);
        }

        Ok(())
    }

    /// Check if this configuration has custom CA certificates
    pub fn has_custom_ca_certs(&self) -> bool {
        !self.ca_cert_files.is_empty() || !self.ca_cert_pem.is_empty()
    }
}

/// TLS configuration errors
#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("CA certificate file not found: {0:?}")]
    CaCertFileNotFound(PathBuf),

    #[error("Failed to read CA certificate file {path:?}: {source}")]
    CaCertFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No certificate found in PEM content from {origin}")]
    EmptyPem { origin: String },

    #[error("Invalid certificate from {origin}: {message}")]
    InvalidCertificate { origin: String, message: String },

    #[error("System roots disabled and no CA certificates configured")]
    NoTrustRoots,

    #[error("Failed to apply TLS configuration: {0}")]
    ClientBuild(String),
}

/// One trusted CA certificate
#[derive(Clone)]
pub struct TrustedCertificate {
    der: CertificateDer<'static>,
    origin: String,
}

impl std::fmt::Debug for TrustedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustedCertificate")
            .field("origin", &self.origin)
            .finish()
    }
}

impl TrustedCertificate {
    /// Parse every certificate in a PEM bundle.
    ///
    /// `origin` names the source (file path, "inline") in errors and logs.
    pub fn from_pem(pem: &[u8], origin: impl Into<String>) -> Result<Vec<Self>, TlsConfigError> {
        let origin = origin.into();
        if !validate_pem_format(&String::from_utf8_lossy(pem)) {
            return Err(TlsConfigError::EmptyPem { origin });
        }

        let ders = CertificateDer::pem_slice_iter(pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TlsConfigError::InvalidCertificate {
                origin: origin.clone(),
                message: e.to_string(),
            })?;
        if ders.is_empty() {
            return Err(TlsConfigError::EmptyPem { origin });
        }

        ders.into_iter()
            .enumerate()
            .map(|(i, der)| Self::checked(der, format!("{origin}#{i}")))
            .collect()
    }

    /// Parse a single DER-encoded certificate
    pub fn from_der(der: &[u8], origin: impl Into<String>) -> Result<Self, TlsConfigError> {
        Self::checked(CertificateDer::from(der.to_vec()), origin.into())
    }

    /// Reject anything that cannot serve as a trust anchor
    fn checked(der: CertificateDer<'static>, origin: String) -> Result<Self, TlsConfigError> {
        RootCertStore::empty()
            .add(der.clone())
            .map_err(|e| TlsConfigError::InvalidCertificate {
                origin: origin.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { der, origin })
    }

    /// Where this certificate came from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// DER encoding
    pub fn der(&self) -> &[u8] {
        self.der.as_ref()
    }
}

/// Trust set of one gateway
#[derive(Debug, Clone)]
pub struct TrustStore {
    certificates: Vec<TrustedCertificate>,
    use_system_roots: bool,
    skip_verification: bool,
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::system()
    }
}

impl TrustStore {
    /// System roots only
    pub fn system() -> Self {
        Self {
            certificates: Vec::new(),
            use_system_roots: true,
            skip_verification: false,
        }
    }

    /// System roots plus `certificates`
    pub fn with_certificates(certificates: Vec<TrustedCertificate>) -> Self {
        Self {
            certificates,
            ..Self::system()
        }
    }

    /// Only `certificates`; system roots are not trusted
    pub fn exclusive(certificates: Vec<TrustedCertificate>) -> Self {
        Self {
            certificates,
            use_system_roots: false,
            skip_verification: false,
        }
    }

    /// Accept any server certificate
    pub fn skip_verification() -> Self {
        Self {
            certificates: Vec::new(),
            use_system_roots: true,
            skip_verification: true,
        }
    }

    /// Load the trust set described by `config`, reading files eagerly so a
    /// bad certificate fails here rather than on the first request.
    pub fn from_config(config: &TlsConfig) -> Result<Self, TlsConfigError> {
        config.validate()?;

        let mut certificates = Vec::new();
        for path in &config.ca_cert_files {
            let pem = std::fs::read(path).map_err(|source| TlsConfigError::CaCertFileUnreadable {
                path: path.clone(),
                source,
            })?;
            certificates.extend(TrustedCertificate::from_pem(&pem, path.display().to_string())?);
        }
        for (i, pem) in config.ca_cert_pem.iter().enumerate() {
            certificates.extend(TrustedCertificate::from_pem(pem.as_bytes(), format!("inline[{i}]"))?);
        }

        Ok(Self {
            certificates,
            use_system_roots: config.use_system_roots,
            skip_verification: config.skip_ssl_validation,
        })
    }

    /// Trusted certificates in order
    pub fn certificates(&self) -> &[TrustedCertificate] {
        &self.certificates
    }

    /// Whether the system roots are trusted
    pub fn uses_system_roots(&self) -> bool {
        self.use_system_roots
    }

    /// Whether verification is skipped
    pub fn skips_verification(&self) -> bool {
        self.skip_verification
    }

    /// Configure a client builder to verify against this trust set
    pub fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder, TlsConfigError> {
        if self.skip_verification {
            return Ok(builder.danger_accept_invalid_certs(true));
        }
        Ok(builder.use_preconfigured_tls(self.client_config()?))
    }

    fn client_config(&self) -> Result<ClientConfig, TlsConfigError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        if self.use_system_roots {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        for trusted in &self.certificates {
            roots
                .add(trusted.der.clone())
                .map_err(|e| TlsConfigError::InvalidCertificate {
                    origin: trusted.origin.clone(),
                    message: e.to_string(),
                })?;
        }
        if roots.is_empty() {
            return Err(TlsConfigError::NoTrustRoots);
        }

        let verifier = TrustedCertVerifier::new(&self.certificates, roots, provider.clone())?;
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsConfigError::ClientBuild(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        Ok(config)
    }
}

/// Accepts a server certificate that is byte-for-byte one of the trusted
/// certificates, and otherwise requires a chain to the trust roots.
#[derive(Debug)]
struct TrustedCertVerifier {
    trusted: Vec<CertificateDer<'static>>,
    chain: Arc<WebPkiServerVerifier>,
}

impl TrustedCertVerifier {
    fn new(
        certificates: &[TrustedCertificate],
        roots: RootCertStore,
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, TlsConfigError> {
        let chain = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| TlsConfigError::ClientBuild(e.to_string()))?;
        Ok(Self {
            trusted: certificates.iter().map(|c| c.der.clone()).collect(),
            chain,
        })
    }
}

impl ServerCertVerifier for TrustedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.trusted.iter().any(|cert| cert.as_ref() == end_entity.as_ref()) {
            // still bound to the name being dialled
            verify_server_name(&ParsedCertificate::try_from(end_entity)?, server_name)?;
            return Ok(ServerCertVerified::assertion());
        }
        self.chain
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.chain.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.chain.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.chain.supported_verify_schemes()
    }
}

/// Helper function to validate PEM format
pub fn validate_pem_format(pem_content: &str) -> bool {
    pem_content.contains("-----BEGIN") && pem_content.contains("-----END")
}
