//! Client configuration types and builders.

use std::net::SocketAddr;
use std::time::Duration;

/// Default native protocol port.
pub const DEFAULT_PORT: u16 = 9042;
/// Default connection timeout.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default first reconnection delay.
const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(2_000);
/// Default reconnection delay ceiling.
const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_millis(300_000);

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for cql_core::CqlError {
    fn from(err: ConfigError) -> Self {
        cql_core::CqlError::Configuration(err.message)
    }
}

/// Network configuration for node connections.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    connection_timeout: Duration,
}

impl NetworkConfig {
    /// Returns the timeout applied to each connection attempt.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

/// Builder for `NetworkConfig`.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfigBuilder {
    connection_timeout: Option<Duration>,
}

impl NetworkConfigBuilder {
    /// Creates a new network configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connection timeout duration.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Builds the network configuration.
    pub fn build(self) -> Result<NetworkConfig, ConfigError> {
        let connection_timeout = self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT);
        if connection_timeout.is_zero() {
            return Err(ConfigError::new("connection_timeout must be positive"));
        }

        Ok(NetworkConfig { connection_timeout })
    }
}

/// Reconnection schedule configuration for the control connection.
///
/// Delays start at `base_delay` and double on each failed attempt until they
/// reach `max_delay`, where they stay.
#[derive(Debug, Clone)]
pub struct ReconnectionConfig {
    base_delay: Duration,
    max_delay: Duration,
}

impl ReconnectionConfig {
    /// Returns the delay before the first reconnection attempt.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the ceiling for reconnection delays.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_delay: DEFAULT_RECONNECT_MAX_DELAY,
        }
    }
}

impl From<ReconnectionConfig> for ReconnectionConfigBuilder {
    fn from(config: ReconnectionConfig) -> Self {
        Self {
            base_delay: Some(config.base_delay),
            max_delay: Some(config.max_delay),
        }
    }
}

/// Builder for `ReconnectionConfig`.
#[derive(Debug, Clone, Default)]
pub struct ReconnectionConfigBuilder {
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
}

impl ReconnectionConfigBuilder {
    /// Creates a new reconnection configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay before the first reconnection attempt.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Sets the ceiling for reconnection delays.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Builds the reconnection configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `base_delay` is zero
    /// - `base_delay` exceeds `max_delay`
    pub fn build(self) -> Result<ReconnectionConfig, ConfigError> {
        let base_delay = self.base_delay.unwrap_or(DEFAULT_RECONNECT_BASE_DELAY);
        let max_delay = self.max_delay.unwrap_or(DEFAULT_RECONNECT_MAX_DELAY);

        if base_delay.is_zero() {
            return Err(ConfigError::new("base_delay must be positive"));
        }

        if base_delay > max_delay {
            return Err(ConfigError::new("base_delay must not exceed max_delay"));
        }

        Ok(ReconnectionConfig {
            base_delay,
            max_delay,
        })
    }
}

/// Main client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    contact_points: Vec<SocketAddr>,
    port: u16,
    network: NetworkConfig,
    reconnection: ReconnectionConfig,
}

impl ClientConfig {
    /// Creates a new client configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the initial node addresses used to seed the cluster metadata.
    pub fn contact_points(&self) -> &[SocketAddr] {
        &self.contact_points
    }

    /// Returns the native protocol port assumed for discovered peers.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Returns the reconnection configuration.
    pub fn reconnection(&self) -> &ReconnectionConfig {
        &self.reconnection
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            contact_points: vec![SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))],
            port: DEFAULT_PORT,
            network: NetworkConfig::default(),
            reconnection: ReconnectionConfig::default(),
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    contact_points: Vec<SocketAddr>,
    port: Option<u16>,
    network: NetworkConfigBuilder,
    reconnection: ReconnectionConfigBuilder,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a contact point.
    pub fn add_contact_point(mut self, address: SocketAddr) -> Self {
        self.contact_points.push(address);
        self
    }

    /// Sets the contact points, replacing any previously configured.
    pub fn contact_points(mut self, addresses: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.contact_points = addresses.into_iter().collect();
        self
    }

    /// Sets the native protocol port assumed for discovered peers.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Configures network settings using a builder function.
    pub fn network<F>(mut self, f: F) -> Self
    where
        F: FnOnce(NetworkConfigBuilder) -> NetworkConfigBuilder,
    {
        self.network = f(self.network);
        self
    }

    /// Configures reconnection settings using a builder function.
    pub fn reconnection<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ReconnectionConfigBuilder) -> ReconnectionConfigBuilder,
    {
        self.reconnection = f(self.reconnection);
        self
    }

    /// Sets the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.connection_timeout(timeout);
        self
    }

    /// Builds the client configuration, returning an error if validation fails.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let port = self.port.unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(ConfigError::new("port must not be 0"));
        }

        let contact_points = if self.contact_points.is_empty() {
            vec![SocketAddr::from(([127, 0, 0, 1], port))]
        } else {
            self.contact_points
        };

        let network = self.network.build()?;
        let reconnection = self.reconnection.build()?;

        Ok(ClientConfig {
            contact_points,
            port,
            network,
            reconnection,
        })
    }
}
