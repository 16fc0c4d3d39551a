//! Health-aware load balancing decorator.
//!
//! Wraps any [`LoadBalancer`] and restricts its choice to servers the
//! background prober currently considers reachable. When every server is
//! down it hands the base strategy the full list instead of failing, so the
//! caller gets a real connect error for a concrete address.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::HealthCheckConfig;
use crate::error::DriverResult;
use crate::health::active::ServerProber;
use crate::health::state::HealthTable;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{LoadBalancer, ServerAddress};

pub struct HealthAwareLoadBalancer<B> {
    base: B,
    table: Arc<HealthTable>,
    shutdown: Shutdown,
    prober: Mutex<Option<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

impl<B: LoadBalancer> HealthAwareLoadBalancer<B> {
    /// Wrap `base` and start probing its servers right away.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(base: B, config: &HealthCheckConfig) -> Self {
        let table = Arc::new(HealthTable::new(base.servers()));
        let shutdown = Shutdown::new();

        let prober = ServerProber::new(table.clone(), config);
        let handle = tokio::spawn(prober.run(shutdown.subscribe()));

        Self {
            base,
            table,
            shutdown,
            prober: Mutex::new(Some(handle)),
            shutdown_grace: config.shutdown_grace(),
        }
    }

    /// Availability flags, shared with the prober.
    pub fn health(&self) -> &HealthTable {
        &self.table
    }

    pub fn snapshot(&self) -> Vec<(ServerAddress, bool)> {
        self.table.snapshot()
    }

    /// Stop the prober. Waits up to the configured grace period for the
    /// probe task to exit, then aborts it. Safe to call more than once.
    pub async fn close(&self) {
        if !self.shutdown.trigger() {
            return;
        }

        let handle = match self.prober.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(self.shutdown_grace, &mut handle).await {
            Ok(_) => tracing::debug!("Server prober stopped"),
            Err(_) => {
                tracing::warn!(
                    grace_ms = self.shutdown_grace.as_millis() as u64,
                    "Server prober did not stop in time, aborting"
                );
                handle.abort();
            }
        }
    }
}

impl<B: LoadBalancer> LoadBalancer for HealthAwareLoadBalancer<B> {
    fn select_from(&self, candidates: &[ServerAddress]) -> DriverResult<ServerAddress> {
        let available: Vec<ServerAddress> = candidates
            .iter()
            .filter(|address| self.table.is_available(address))
            .cloned()
            .collect();

        if available.is_empty() {
            tracing::debug!(
                candidates = candidates.len(),
                "No server currently available, selecting from full list"
            );
            return self.base.select_from(candidates);
        }
        self.base.select_from(&available)
    }

    fn servers(&self) -> &[ServerAddress] {
        self.base.servers()
    }
}

impl<B> Drop for HealthAwareLoadBalancer<B> {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Ok(mut guard) = self.prober.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

impl<B: std::fmt::Debug> std::fmt::Debug for HealthAwareLoadBalancer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAwareLoadBalancer")
            .field("base", &self.base)
            .field("health", &self.table)
            .field("closed", &self.shutdown.is_triggered())
            .finish()
    }
}
