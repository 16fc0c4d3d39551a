//! Driver facade.
//!
//! Wires configuration into the pool, balancer and dispatcher, and exposes the
//! calls a service makes: send a request, read statistics, close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{validate_config, ConfigError, DriverConfig};
use crate::dispatch::Dispatcher;
use crate::error::{DriverError, DriverResult};
use crate::health::ConnectionHealthChecker;
use crate::load_balancer::{HealthAwareLoadBalancer, LoadBalancer, RandomLoadBalancer, ServerAddress};
use crate::net::IdleReaper;
use crate::pool::{ConnectionHooks, PoolCounters, PoolStats, Router};
use crate::protocol::{Request, ResponseDecoder};

/// Client driver for a set of graph server replicas.
#[derive(Debug)]
pub struct Driver {
    dispatcher: Dispatcher,
    balancer: Option<Arc<HealthAwareLoadBalancer<RandomLoadBalancer>>>,
    counters: Arc<PoolCounters>,
    default_timeout: Duration,
    closed: AtomicBool,
}

impl Driver {
    /// Validate `config` and build the driver. Starts the server prober when
    /// health checking is enabled, so this must run inside a Tokio runtime.
    pub fn new(config: DriverConfig) -> DriverResult<Self> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let servers = config.server_addresses();
        let counters = Arc::new(PoolCounters::default());
        let hooks = Arc::new(ConnectionHooks::new(
            counters.clone(),
            IdleReaper::from_config(&config.idle),
        ));
        let checker = ConnectionHealthChecker::from_config(&config.connection);

        let base = RandomLoadBalancer::new(servers.clone());
        let mut balancer = None;
        let selector: Arc<dyn LoadBalancer> = if config.health_check.enabled {
            let health_aware = Arc::new(HealthAwareLoadBalancer::new(base, &config.health_check));
            balancer = Some(health_aware.clone());
            health_aware
        } else {
            Arc::new(base)
        };

        let router = Router::new(&servers, selector, &config.pool, hooks, checker);

        tracing::info!(
            servers = servers.len(),
            max_connections = config.pool.max_connections,
            health_check = config.health_check.enabled,
            "Driver started"
        );

        Ok(Self {
            dispatcher: Dispatcher::new(router, config.credentials),
            balancer,
            counters,
            default_timeout: Duration::from_millis(config.request.default_timeout_ms),
            closed: AtomicBool::new(false),
        })
    }

    /// Send `request` and decode its response, failing after `timeout`.
    pub async fn send<D: ResponseDecoder>(
        &self,
        request: &Request,
        decoder: D,
        timeout: Duration,
    ) -> DriverResult<D::Output> {
        if self.is_closed() {
            return Err(DriverError::DriverClosed);
        }
        self.dispatcher.send(request, decoder, timeout).await
    }

    /// [`send`](Self::send) with the configured default timeout.
    pub async fn send_default<D: ResponseDecoder>(&self, request: &Request, decoder: D) -> DriverResult<D::Output> {
        self.send(request, decoder, self.default_timeout).await
    }

    /// The server the next call would go to.
    pub fn select_server(&self) -> DriverResult<ServerAddress> {
        self.dispatcher.router().balancer().select_server()
    }

    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Availability per server. Every server reports available when health
    /// checking is disabled.
    pub fn server_health(&self) -> Vec<(ServerAddress, bool)> {
        match &self.balancer {
            Some(balancer) => balancer.snapshot(),
            None => self
                .dispatcher
                .router()
                .balancer()
                .servers()
                .iter()
                .map(|address| (address.clone(), true))
                .collect(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every pool and stop the prober. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.dispatcher.router().close();
        if let Some(balancer) = &self.balancer {
            balancer.close().await;
        }
        tracing::info!("Driver closed");
    }
}
