//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the driver.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::ServerAddress;

/// Root configuration for the driver.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DriverConfig {
    /// Graph server replicas.
    pub servers: Vec<ServerConfig>,

    /// Credentials stamped on every request.
    pub credentials: CredentialsConfig,

    /// Per-address pool settings.
    pub pool: PoolConfig,

    /// Connection health gate applied on acquire.
    pub connection: ConnectionCheckConfig,

    /// Active server probing.
    pub health_check: HealthCheckConfig,

    /// Idle connection reclamation.
    pub idle: IdleConfig,

    /// Request defaults.
    pub request: RequestConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl DriverConfig {
    /// Config for the given servers with every other section defaulted.
    pub fn with_servers(servers: impl IntoIterator<Item = ServerAddress>) -> Self {
        Self {
            servers: servers.into_iter().map(ServerConfig::from).collect(),
            ..Self::default()
        }
    }

    /// Configured server addresses, in declaration order.
    pub fn server_addresses(&self) -> Vec<ServerAddress> {
        self.servers.iter().map(ServerConfig::address).collect()
    }
}

/// A single graph server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> ServerAddress {
        ServerAddress::new(self.host.clone(), self.port)
    }
}

impl From<ServerAddress> for ServerConfig {
    fn from(address: ServerAddress) -> Self {
        Self {
            host: address.host().to_string(),
            port: address.port(),
        }
    }
}

/// Username/password pair. Opaque to the driver; forwarded with each request.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What to do when no connection frees up within the acquire timeout.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcquireTimeoutAction {
    /// Fail the acquisition with a pool-exhausted error.
    #[default]
    Fail,
    /// Keep waiting in the queue until a connection is released.
    Wait,
}

/// Per-address connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum connections on loan (and alive) per address.
    pub max_connections: usize,

    /// Maximum callers waiting for a connection per address.
    pub max_pending_acquires: usize,

    /// How long an acquisition may wait for a free connection.
    pub acquire_timeout_ms: u64,

    /// Behaviour once `acquire_timeout_ms` elapses.
    pub acquire_timeout_action: AcquireTimeoutAction,

    /// TCP connect timeout for new pooled connections.
    pub connect_timeout_ms: u64,
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            max_pending_acquires: 64,
            acquire_timeout_ms: 5_000,
            acquire_timeout_action: AcquireTimeoutAction::Fail,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Named connection health-check profiles.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckProfile {
    /// 60 s max idle, no active probe.
    #[default]
    Default,
    /// 30 s max idle, active probe on every acquire.
    Strict,
}

/// Connection health gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ConnectionCheckConfig {
    /// Base profile.
    pub profile: CheckProfile,

    /// Overrides the profile's max idle time.
    pub max_idle_ms: Option<u64>,
}

/// Active health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active probing. When disabled, selection is plain random.
    pub enabled: bool,

    /// Interval between probe rounds in milliseconds.
    pub interval_ms: u64,

    /// Probe connect timeout in milliseconds.
    pub connection_timeout_ms: u64,

    /// How long `close()` waits for the probe task before aborting it.
    pub shutdown_grace_ms: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            connection_timeout_ms: 2_000,
            shutdown_grace_ms: 1_000,
        }
    }
}

/// Action taken when a connection has seen no traffic for the idle window.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdlePolicy {
    /// Close the connection; the pool replaces it on demand.
    #[default]
    Close,
    /// Send a protocol heartbeat. The wire protocol has none yet.
    Heartbeat,
    /// Only log the event.
    LogOnly,
}

/// Idle connection reclamation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdleConfig {
    pub enabled: bool,

    /// No-traffic window in milliseconds before the idle signal fires.
    pub idle_timeout_ms: u64,

    pub policy: IdlePolicy,
}

impl IdleConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_timeout_ms: 30_000,
            policy: IdlePolicy::Close,
        }
    }
}

/// Request defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Timeout used by `Driver::send_default`.
    pub default_timeout_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}
