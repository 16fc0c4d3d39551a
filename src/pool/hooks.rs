//! Connection lifecycle hooks and pool counters.
//!
//! # Responsibilities
//! - Open TCP connections and configure the socket
//! - Install the frame codec and start the I/O task
//! - Track alive / active / created counters across every pool
//!
//! # Design Decisions
//! - One counter set shared by all per-server pools
//! - `alive` is decremented by the connection's own close listener, so it
//!   follows the transport, not the pool's bookkeeping

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::time;

use crate::error::{DriverError, DriverResult};
use crate::load_balancer::ServerAddress;
use crate::net::{Connection, FrameCodec, IdleReaper};
use crate::observability::metrics;

/// Point-in-time driver statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently on loan.
    pub active_connections: u64,
    /// Connections opened since the driver started.
    pub total_created_connections: u64,
    /// Connections whose transport is still open.
    pub alive_connections: u64,
}

#[derive(Debug, Default)]
pub struct PoolCounters {
    active: AtomicU64,
    total_created: AtomicU64,
    alive: AtomicU64,
}

impl PoolCounters {
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            active_connections: self.active.load(Ordering::Acquire),
            total_created_connections: self.total_created.load(Ordering::Acquire),
            alive_connections: self.alive.load(Ordering::Acquire),
        }
    }
}

/// Create / acquire / release callbacks run by every endpoint pool.
#[derive(Debug)]
pub struct ConnectionHooks {
    counters: Arc<PoolCounters>,
    reaper: Option<IdleReaper>,
}

impl ConnectionHooks {
    pub fn new(counters: Arc<PoolCounters>, reaper: Option<IdleReaper>) -> Self {
        Self { counters, reaper }
    }

    pub fn counters(&self) -> &Arc<PoolCounters> {
        &self.counters
    }

    /// Open a new connection to `address`.
    pub async fn connect(&self, address: &ServerAddress, timeout: Duration) -> DriverResult<Connection> {
        let stream = match time::timeout(timeout, TcpStream::connect(address.connect_target())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                tracing::warn!(server = %address, error = %source, "Connect failed");
                return Err(DriverError::Connect {
                    address: address.clone(),
                    source,
                });
            }
            Err(_) => {
                tracing::warn!(server = %address, timeout_ms = timeout.as_millis() as u64, "Connect timed out");
                return Err(DriverError::ConnectTimeout {
                    address: address.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };
        Ok(self.on_create(stream, address.clone()))
    }

    /// Configure a freshly connected stream and start its I/O task.
    pub fn on_create(&self, stream: TcpStream, address: ServerAddress) -> Connection {
        if let Err(e) = SockRef::from(&stream).set_keepalive(true) {
            tracing::warn!(server = %address, error = %e, "Failed to enable TCP keepalive");
        }
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(server = %address, error = %e, "Failed to disable Nagle");
        }

        self.counters.total_created.fetch_add(1, Ordering::AcqRel);
        self.counters.alive.fetch_add(1, Ordering::AcqRel);
        metrics::record_connection_created(&address);
        metrics::record_pool_counters(&self.counters.snapshot());

        let counters = self.counters.clone();
        let conn = Connection::spawn(
            stream,
            address,
            FrameCodec::new(),
            self.reaper.clone(),
            Box::new(move |address| {
                counters.alive.fetch_sub(1, Ordering::AcqRel);
                metrics::record_pool_counters(&counters.snapshot());
                tracing::debug!(server = %address, "Connection removed from alive set");
            }),
        );
        conn.touch();

        tracing::debug!(connection_id = %conn.id(), server = %conn.address(), "Connection created");
        conn
    }

    /// Put the connection on loan. Returns false if the idle reaper claimed it
    /// first; the caller must then discard it.
    pub fn on_acquire(&self, conn: &Connection) -> bool {
        if !conn.try_lend() {
            return false;
        }
        self.counters.active.fetch_add(1, Ordering::AcqRel);
        metrics::record_pool_counters(&self.counters.snapshot());
        true
    }

    pub fn on_release(&self, conn: &Connection) {
        if conn.remove_handler().is_some() {
            tracing::warn!(
                connection_id = %conn.id(),
                server = %conn.address(),
                "Response handler still installed at release"
            );
        }
        conn.end_loan();
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
        metrics::record_pool_counters(&self.counters.snapshot());
    }
}
