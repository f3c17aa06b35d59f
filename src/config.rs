//! Configuration management for the registry client.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{RegistryError, Result};
use crate::ratelimit::TimeWindow;
use crate::transport::DEFAULT_ENDPOINT;

/// Prefix for environment variable overrides, e.g. `REGISTRY__LIMITER__LIMIT`.
const ENV_PREFIX: &str = "REGISTRY";

/// Main configuration for the registry client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum submissions admitted per window
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Length of the counting window
    #[serde(default)]
    pub unit: TimeWindow,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            unit: TimeWindow::default(),
        }
    }
}

fn default_limit() -> u32 {
    10
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Registry document endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Value of the Authorization header
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            auth_token: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading client configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ClientConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RegistryError::Config(format!("Failed to parse client config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration layered from an optional file and the environment.
    ///
    /// Environment variables use the `REGISTRY__` prefix with `__` between
    /// sections, so `REGISTRY__TRANSPORT__AUTH_TOKEN` sets the auth token.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading client configuration");
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config: ClientConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RegistryError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.limit == 0 {
            return Err(RegistryError::Config("limiter.limit must be greater than zero".into()));
        }
        if self.transport.endpoint.is_empty() {
            return Err(RegistryError::Config("transport.endpoint must not be empty".into()));
        }
        Ok(())
    }
}
