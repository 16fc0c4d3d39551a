//! Active server probing.
//!
//! # Responsibilities
//! - Periodically probe every known server with connect-and-close
//! - Update the shared [`HealthTable`] from the results

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::health::state::HealthTable;
use crate::load_balancer::ServerAddress;
use crate::observability::metrics;

pub struct ServerProber {
    table: Arc<HealthTable>,
    interval: Duration,
    connect_timeout: Duration,
}

impl ServerProber {
    pub fn new(table: Arc<HealthTable>, config: &HealthCheckConfig) -> Self {
        Self {
            table,
            interval: config.interval(),
            connect_timeout: config.connection_timeout(),
        }
    }

    /// Probe immediately, then every interval, until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            connect_timeout_ms = self.connect_timeout.as_millis() as u64,
            servers = self.table.entries().len(),
            "Server prober starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Server prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one probe round against every server concurrently.
    pub async fn probe_all(&self) {
        let probes = self
            .table
            .entries()
            .iter()
            .map(|entry| async move {
                let reachable = probe(entry.address(), self.connect_timeout).await;
                if reachable {
                    if entry.mark_available() {
                        tracing::info!(server = %entry.address(), "Server is reachable again");
                    }
                } else if entry.mark_unavailable() {
                    tracing::warn!(server = %entry.address(), "Server marked unavailable");
                }
                metrics::record_server_health(entry.address(), reachable);
            });
        join_all(probes).await;
    }
}

/// Open a TCP connection to `address` and close it again.
pub async fn probe(address: &ServerAddress, connect_timeout: Duration) -> bool {
    match time::timeout(connect_timeout, TcpStream::connect(address.connect_target())).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            tracing::debug!(server = %address, error = %e, "Probe failed: connection error");
            false
        }
        Err(_) => {
            tracing::debug!(server = %address, "Probe failed: timeout");
            false
        }
    }
}
