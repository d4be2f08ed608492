//! Administrative control connection for a CQL cluster driver.
//!
//! The control connection keeps one live connection to some node of the
//! cluster, separate from the connections used for user queries. Over it the
//! driver subscribes to topology, status and schema change events, discovers
//! the cluster's nodes and reads the schema. When the connection is lost it
//! reconnects in the background with exponential backoff.
//!
//! The transport is pluggable: supply a [`ConnectionFactory`] that opens
//! [`Connection`]s speaking the typed messages of [`cql_core::protocol`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cql_client::{ClientConfig, ControlConnection, Metadata};
//!
//! let config = ClientConfig::builder()
//!     .add_contact_point("10.0.0.1:9042".parse()?)
//!     .build()?;
//! let metadata = Arc::new(Metadata::with_contact_points(config.contact_points().to_vec()));
//! let control = ControlConnection::builder(Arc::new(MyFactory::new()), metadata.clone())
//!     .config(config)
//!     .build();
//!
//! control.connect().await?;
//! control.refresh_schema(Some("ks1"), None).await?;
//! control.shutdown().await;
//! ```
//!
//! # Reconnection
//!
//! A connection fault on the active connection, during a refresh or
//! reported through [`HostStateListener::on_down`], starts a reconnection
//! session. Only one session runs at a time. The session retries the whole
//! bring-up sequence on the delays of the configured [`ReconnectionPolicy`]
//! until it succeeds or the control connection is shut down.
//!
//! # Configuration
//!
//! ```rust,ignore
//! use cql_client::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .add_contact_point("10.0.0.1:9042".parse().unwrap())
//!     .connection_timeout(Duration::from_secs(10))
//!     .reconnection(|r| r
//!         .base_delay(Duration::from_millis(500))
//!         .max_delay(Duration::from_secs(60)))
//!     .build()?;
//! ```
//!
//! Configuration can also be read from `CQL_*` environment variables, and
//! from YAML or TOML files with the `config-file` feature.

#![warn(missing_docs)]

pub mod cluster;
pub mod config;
pub mod config_file;
pub mod connection;
pub mod listener;
pub mod metadata;
pub mod policy;

pub use cluster::{ControlConnection, ControlConnectionBuilder, RefreshOutcome};
pub use config::{
    ClientConfig, ClientConfigBuilder, ConfigError, NetworkConfig, NetworkConfigBuilder,
    ReconnectionConfig, ReconnectionConfigBuilder,
};
pub use connection::{Awaited, Connection, ConnectionFactory, ConnectionId};
pub use cql_core::{CqlError, NoHostAvailable, Result};
pub use listener::{ControlConnectionEvent, ControlConnectionState, HostStateListener};
pub use metadata::{ClusterMetadata, Host, HostState, Metadata};
pub use policy::{
    ConstantReconnectionPolicy, ExponentialReconnectionPolicy, LoadBalancingPolicy,
    ReconnectionPolicy, RoundRobinPolicy,
};
