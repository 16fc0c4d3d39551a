//! Idle connection reclamation.
//!
//! The connection I/O task raises an idle signal after a window with no read
//! or write traffic. The reaper decides what to do about it. It is never
//! consulted for a connection that is on loan.

use std::time::Duration;

use crate::config::{IdleConfig, IdlePolicy};
use crate::load_balancer::ServerAddress;
use crate::net::connection::ConnectionId;
use crate::observability::metrics;

/// Decision for an idle connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    Close,
    Keep,
}

#[derive(Debug, Clone)]
pub struct IdleReaper {
    window: Duration,
    policy: IdlePolicy,
}

impl IdleReaper {
    pub fn new(window: Duration, policy: IdlePolicy) -> Self {
        Self { window, policy }
    }

    /// `None` when idle detection is disabled.
    pub fn from_config(config: &IdleConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.idle_timeout(), config.policy))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn policy(&self) -> IdlePolicy {
        self.policy
    }

    pub fn on_idle(&self, id: ConnectionId, address: &ServerAddress) -> IdleAction {
        match self.policy {
            IdlePolicy::Close => {
                tracing::debug!(
                    connection_id = %id,
                    server = %address,
                    idle_ms = self.window.as_millis() as u64,
                    "Closing idle connection"
                );
                metrics::record_idle_reaped(address);
                IdleAction::Close
            }
            IdlePolicy::Heartbeat => {
                // TODO: send a heartbeat frame once the server protocol defines one.
                tracing::debug!(
                    connection_id = %id,
                    server = %address,
                    "Idle heartbeat requested but the wire protocol has no heartbeat frame"
                );
                IdleAction::Keep
            }
            IdlePolicy::LogOnly => {
                tracing::info!(connection_id = %id, server = %address, "Connection idle");
                IdleAction::Keep
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies() {
        let address = ServerAddress::new("a", 1);
        let id = ConnectionId::new();
        let window = Duration::from_millis(10);

        assert_eq!(IdleReaper::new(window, IdlePolicy::Close).on_idle(id, &address), IdleAction::Close);
        assert_eq!(IdleReaper::new(window, IdlePolicy::Heartbeat).on_idle(id, &address), IdleAction::Keep);
        assert_eq!(IdleReaper::new(window, IdlePolicy::LogOnly).on_idle(id, &address), IdleAction::Keep);
    }

    #[test]
    fn test_disabled_config_yields_no_reaper() {
        let config = IdleConfig {
            enabled: false,
            ..IdleConfig::default()
        };
        assert!(IdleReaper::from_config(&config).is_none());

        let reaper = IdleReaper::from_config(&IdleConfig::default()).unwrap();
        assert_eq!(reaper.window(), Duration::from_secs(30));
        assert_eq!(reaper.policy(), IdlePolicy::Close);
    }
}
