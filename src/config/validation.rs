//! Configuration validation.
//!
//! Serde handles the syntax; this module checks value ranges and that the
//! server list is usable. All errors are collected, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::DriverConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &DriverConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.servers.is_empty() {
        errors.push(ValidationError::new("servers", "at least one server is required"));
    }

    let mut seen = HashSet::new();
    for (i, server) in config.servers.iter().enumerate() {
        if server.host.trim().is_empty() {
            errors.push(ValidationError::new(format!("servers[{}].host", i), "must not be empty"));
        }
        if server.port == 0 {
            errors.push(ValidationError::new(format!("servers[{}].port", i), "must not be 0"));
        }
        if !seen.insert(server.address()) {
            errors.push(ValidationError::new(
                format!("servers[{}]", i),
                format!("duplicate server {}", server.address()),
            ));
        }
    }

    let positive = [
        ("pool.max_connections", config.pool.max_connections as u64),
        ("pool.acquire_timeout_ms", config.pool.acquire_timeout_ms),
        ("pool.connect_timeout_ms", config.pool.connect_timeout_ms),
        ("request.default_timeout_ms", config.request.default_timeout_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.connection.max_idle_ms == Some(0) {
        errors.push(ValidationError::new("connection.max_idle_ms", "must be greater than 0"));
    }

    if config.health_check.enabled {
        if config.health_check.interval_ms == 0 {
            errors.push(ValidationError::new("health_check.interval_ms", "must be greater than 0"));
        }
        if config.health_check.connection_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "health_check.connection_timeout_ms",
                "must be greater than 0",
            ));
        }
    }

    if config.idle.enabled && config.idle.idle_timeout_ms == 0 {
        errors.push(ValidationError::new("idle.idle_timeout_ms", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServerConfig;
    use crate::load_balancer::ServerAddress;

    #[test]
    fn test_valid_config_passes() {
        let config = DriverConfig::with_servers([ServerAddress::new("127.0.0.1", 8182)]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = DriverConfig::default();
        config.pool.max_connections = 0;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "not-an-address".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"servers"));
        assert!(fields.contains(&"pool.max_connections"));
        assert!(fields.contains(&"observability.metrics_address"));
    }

    #[test]
    fn test_rejects_duplicate_and_malformed_servers() {
        let mut config = DriverConfig::default();
        config.servers = vec![
            ServerConfig { host: "a".into(), port: 1 },
            ServerConfig { host: "a".into(), port: 1 },
            ServerConfig { host: " ".into(), port: 0 },
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].message.contains("duplicate"));
    }
}
