//! Declarative configuration loading from YAML, TOML, and environment variables.
//!
//! File-based configuration is read into serde mirror structs and then
//! converted into the programmatic [`ClientConfig`](crate::config::ClientConfig)
//! through the builder API, so both paths share the same validation.
//!
//! # Supported Formats
//!
//! - **YAML** (requires `config-file` feature): `ClientConfig::from_yaml("cql.yaml")`
//! - **TOML** (requires `config-file` feature): `ClientConfig::from_toml("cql.toml")`
//! - **Environment Variables** (always available): `ClientConfig::from_env()`
//!
//! # Example YAML
//!
//! ```yaml
//! contact-points:
//!   - "10.0.0.1:9042"
//!   - "10.0.0.2"
//! port: 9042
//! network:
//!   connection-timeout-ms: 5000
//! reconnection:
//!   base-delay-ms: 2000
//!   max-delay-ms: 300000
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, ClientConfigBuilder, ConfigError, DEFAULT_PORT};

/// Top-level file-based configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Contact point addresses; entries without a port use `port`.
    pub contact_points: Option<Vec<String>>,
    /// Native protocol port.
    pub port: Option<u16>,
    /// Network configuration.
    pub network: Option<FileNetworkConfig>,
    /// Control connection reconnection configuration.
    pub reconnection: Option<FileReconnectionConfig>,
}

/// File-based network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileNetworkConfig {
    /// Connection timeout in milliseconds.
    pub connection_timeout_ms: Option<u64>,
}

/// File-based reconnection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileReconnectionConfig {
    /// First reconnection delay in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Reconnection delay ceiling in milliseconds.
    pub max_delay_ms: Option<u64>,
}

fn parse_contact_point(raw: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let raw = raw.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.parse::<std::net::IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|_| ConfigError::new(format!("invalid contact point: {raw}")))
}

impl TryFrom<FileConfig> for ClientConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = ClientConfigBuilder::new();
        let port = file.port.unwrap_or(DEFAULT_PORT);

        if let Some(port) = file.port {
            builder = builder.port(port);
        }

        if let Some(points) = file.contact_points {
            let addresses = points
                .iter()
                .map(|p| parse_contact_point(p, port))
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.contact_points(addresses);
        }

        if let Some(net) = file.network {
            builder = builder.network(|mut n| {
                if let Some(ms) = net.connection_timeout_ms {
                    n = n.connection_timeout(Duration::from_millis(ms));
                }
                n
            });
        }

        if let Some(reconnection) = file.reconnection {
            builder = builder.reconnection(|mut r| {
                if let Some(ms) = reconnection.base_delay_ms {
                    r = r.base_delay(Duration::from_millis(ms));
                }
                if let Some(ms) = reconnection.max_delay_ms {
                    r = r.max_delay(Duration::from_millis(ms));
                }
                r
            });
        }

        builder.build()
    }
}

impl ClientConfig {
    /// Loads configuration from a YAML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read YAML config file: {e}")))?;
        let file_config: FileConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse YAML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read TOML config file: {e}")))?;
        let file_config: FileConfig = toml_crate::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from environment variables.
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `CQL_CONTACT_POINTS` | Comma-separated addresses (e.g., `10.0.0.1:9042,10.0.0.2`) |
    /// | `CQL_PORT` | Native protocol port |
    /// | `CQL_CONNECTION_TIMEOUT_MS` | Connection timeout in milliseconds |
    /// | `CQL_RECONNECT_BASE_DELAY_MS` | First reconnection delay in milliseconds |
    /// | `CQL_RECONNECT_MAX_DELAY_MS` | Reconnection delay ceiling in milliseconds |
    ///
    /// Numeric variables that fail to parse are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn number<T: std::str::FromStr>(name: &str, raw: String) -> Result<T, ConfigError> {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::new(format!("{name} must be a number, got '{raw}'")))
        }

        let mut file_config = FileConfig::default();

        if let Some(val) = var("CQL_CONTACT_POINTS") {
            file_config.contact_points = Some(
                val.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }

        if let Some(val) = var("CQL_PORT") {
            file_config.port = Some(number("CQL_PORT", val)?);
        }

        if let Some(val) = var("CQL_CONNECTION_TIMEOUT_MS") {
            file_config
                .network
                .get_or_insert_with(Default::default)
                .connection_timeout_ms = Some(number("CQL_CONNECTION_TIMEOUT_MS", val)?);
        }

        if let Some(val) = var("CQL_RECONNECT_BASE_DELAY_MS") {
            file_config
                .reconnection
                .get_or_insert_with(Default::default)
                .base_delay_ms = Some(number("CQL_RECONNECT_BASE_DELAY_MS", val)?);
        }

        if let Some(val) = var("CQL_RECONNECT_MAX_DELAY_MS") {
            file_config
                .reconnection
                .get_or_insert_with(Default::default)
                .max_delay_ms = Some(number("CQL_RECONNECT_MAX_DELAY_MS", val)?);
        }

        file_config.try_into()
    }
}

/// Loads a configuration file, auto-detecting the format by extension.
///
/// Supports `.yaml`, `.yml`, and `.toml` extensions.
/// Requires the `config-file` feature.
#[cfg(feature = "config-file")]
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => ClientConfig::from_yaml(path),
        Some("toml") => ClientConfig::from_toml(path),
        Some(ext) => Err(ConfigError::new(format!(
            "unsupported config file extension: .{ext} (expected .yaml, .yml, or .toml)"
        ))),
        None => Err(ConfigError::new(
            "config file has no extension; expected .yaml, .yml, or .toml",
        )),
    }
}
