//! Connection health gate applied on every acquire.
//!
//! # Responsibilities
//! - Reject connections whose transport is closed
//! - Reject connections idle longer than the profile allows
//! - Optionally round-trip a liveness ping through the I/O task
//! - Refresh the last-active timestamp of connections that pass

use std::time::Duration;

use crate::config::{CheckProfile, ConnectionCheckConfig};
use crate::net::Connection;

const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(60);
const STRICT_MAX_IDLE: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ConnectionHealthChecker {
    max_idle: Duration,
    active_probe: bool,
    probe_timeout: Duration,
}

impl ConnectionHealthChecker {
    /// 60 s max idle, no active probe.
    pub fn default_profile() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            active_probe: false,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// 30 s max idle, active probe.
    pub fn strict() -> Self {
        Self {
            max_idle: STRICT_MAX_IDLE,
            active_probe: true,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn from_config(config: &ConnectionCheckConfig) -> Self {
        let checker = match config.profile {
            CheckProfile::Default => Self::default_profile(),
            CheckProfile::Strict => Self::strict(),
        };
        match config.max_idle_ms {
            Some(ms) => checker.with_max_idle(Duration::from_millis(ms)),
            None => checker,
        }
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }

    pub fn active_probe(&self) -> bool {
        self.active_probe
    }

    pub async fn is_healthy(&self, conn: &Connection) -> bool {
        if !conn.is_open() {
            tracing::debug!(connection_id = %conn.id(), server = %conn.address(), "Connection closed");
            return false;
        }

        let idle = conn.idle_for();
        if idle > self.max_idle {
            tracing::debug!(
                connection_id = %conn.id(),
                server = %conn.address(),
                idle_ms = idle.as_millis() as u64,
                "Connection idle too long"
            );
            return false;
        }

        if self.active_probe && !conn.ping(self.probe_timeout).await {
            tracing::debug!(connection_id = %conn.id(), server = %conn.address(), "Liveness probe failed");
            return false;
        }

        conn.touch();
        true
    }
}

impl Default for ConnectionHealthChecker {
    fn default() -> Self {
        Self::default_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::FrameCodec;
    use tokio::net::{TcpListener, TcpStream};

    async fn connection() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let conn = Connection::spawn(client, addr.into(), FrameCodec::new(), None, Box::new(|_| {}));
        (conn, server)
    }

    #[test]
    fn test_profiles() {
        let default = ConnectionHealthChecker::from_config(&ConnectionCheckConfig::default());
        assert_eq!(default.max_idle(), Duration::from_secs(60));
        assert!(!default.active_probe());

        let strict = ConnectionHealthChecker::from_config(&ConnectionCheckConfig {
            profile: CheckProfile::Strict,
            max_idle_ms: Some(1_000),
        });
        assert_eq!(strict.max_idle(), Duration::from_secs(1));
        assert!(strict.active_probe());
    }

    #[tokio::test]
    async fn test_open_recent_connection_passes() {
        let (conn, _server) = connection().await;
        assert!(ConnectionHealthChecker::strict().is_healthy(&conn).await);
        assert!(ConnectionHealthChecker::default().is_healthy(&conn).await);
    }

    #[tokio::test]
    async fn test_stale_connection_fails() {
        let (conn, _server) = connection().await;
        let checker = ConnectionHealthChecker::default().with_max_idle(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!checker.is_healthy(&conn).await);
    }

    #[tokio::test]
    async fn test_closed_connection_fails() {
        let (conn, server) = connection().await;
        drop(server);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!ConnectionHealthChecker::default().is_healthy(&conn).await);
    }
}
