//! Gateway configuration
//!
//! Loaded from YAML or JSON files, chosen by extension. Every field has a
//! default, so an empty file is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::http::{TimeoutConfig, TlsConfig};
use crate::{Error, Result};

/// Configuration shared by gateways
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Connect and request timeouts
    pub timeouts: TimeoutConfig,
    /// Trusted CA certificates and verification mode
    pub tls: TlsConfig,
    /// `User-Agent` override
    pub user_agent: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            _ => Self::from_json_str(&content)?,
        };

        tracing::debug!(path = %path.display(), "Loaded gateway configuration");
        Ok(config)
    }

    /// Parse YAML configuration
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| Error::Configuration {
            message: format!("Invalid YAML configuration: {e}"),
            source: Some(e.into()),
        })
    }

    /// Parse JSON configuration
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Check timeouts and TLS settings
    pub fn validate(&self) -> Result<()> {
        self.timeouts.validate().map_err(Error::configuration)?;
        self.tls.validate()?;
        Ok(())
    }
}
