//! Multi-server router.
//!
//! # Responsibilities
//! - Own one [`EndpointPool`] per configured server
//! - Ask the load balancer where each acquire goes
//! - Tag loans with their origin and route releases back to it

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::error::{DriverError, DriverResult};
use crate::health::ConnectionHealthChecker;
use crate::load_balancer::{LoadBalancer, ServerAddress};
use crate::observability::metrics;
use crate::pool::endpoint::{EndpointPool, PooledConnection};
use crate::pool::hooks::ConnectionHooks;

pub struct Router {
    pools: HashMap<ServerAddress, Arc<EndpointPool>>,
    balancer: Arc<dyn LoadBalancer>,
    closed: AtomicBool,
}

impl Router {
    pub fn new(
        servers: &[ServerAddress],
        balancer: Arc<dyn LoadBalancer>,
        config: &PoolConfig,
        hooks: Arc<ConnectionHooks>,
        checker: ConnectionHealthChecker,
    ) -> Self {
        let pools = servers
            .iter()
            .map(|address| {
                let pool = EndpointPool::new(address.clone(), config.clone(), hooks.clone(), checker.clone());
                (address.clone(), Arc::new(pool))
            })
            .collect();

        Self {
            pools,
            balancer,
            closed: AtomicBool::new(false),
        }
    }

    pub fn pool(&self, address: &ServerAddress) -> Option<&Arc<EndpointPool>> {
        self.pools.get(address)
    }

    pub fn balancer(&self) -> &Arc<dyn LoadBalancer> {
        &self.balancer
    }

    pub async fn acquire(&self) -> DriverResult<PooledConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::DriverClosed);
        }

        let address = self.balancer.select_server()?;
        let Some(pool) = self.pools.get(&address) else {
            tracing::error!(server = %address, "Load balancer selected a server with no pool");
            return Err(DriverError::NoPoolForAddress(address));
        };

        match pool.acquire().await {
            Ok(mut loan) => {
                metrics::record_acquire(&address, "ok");
                loan.set_origin(address);
                Ok(loan)
            }
            Err(e) => {
                metrics::record_acquire(&address, e.kind());
                Err(e)
            }
        }
    }

    /// Route a loan back to the pool it came from.
    pub fn release(&self, mut loan: PooledConnection) -> DriverResult<()> {
        let Some(address) = loan.clear_origin() else {
            let id = loan.id().to_string();
            tracing::error!(connection_id = %id, "Connection released without origin tag");
            return Err(DriverError::MissingAddressTag(id));
        };
        match self.pools.get(&address) {
            Some(pool) => {
                pool.release(loan);
                Ok(())
            }
            None => Err(DriverError::NoPoolForAddress(address)),
        }
    }

    /// Close every pool. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for pool in self.pools.values() {
            pool.close();
        }
        tracing::info!(pools = self.pools.len(), "Router closed");
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("pools", &self.pools.keys().collect::<Vec<_>>())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::RandomLoadBalancer;
    use crate::pool::hooks::PoolCounters;
    use tokio::net::TcpListener;

    async fn server() -> ServerAddress {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().into();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        address
    }

    fn router(pooled: &[ServerAddress], balanced: Vec<ServerAddress>) -> Router {
        let hooks = Arc::new(ConnectionHooks::new(Arc::new(PoolCounters::default()), None));
        Router::new(
            pooled,
            Arc::new(RandomLoadBalancer::new(balanced)),
            &PoolConfig::default(),
            hooks,
            ConnectionHealthChecker::default(),
        )
    }

    #[tokio::test]
    async fn test_acquire_tags_origin_and_release_routes_back() {
        let address = server().await;
        let router = router(&[address.clone()], vec![address.clone()]);

        let loan = router.acquire().await.unwrap();
        assert_eq!(loan.origin(), Some(&address));
        router.release(loan).unwrap();
        assert_eq!(router.pool(&address).unwrap().idle_count(), 1);
    }

    #[tokio::test]
    async fn test_divergent_balancer_is_reported() {
        let pooled = server().await;
        let stray = server().await;
        let router = router(&[pooled], vec![stray.clone()]);

        match router.acquire().await {
            Err(DriverError::NoPoolForAddress(address)) => assert_eq!(address, stray),
            other => panic!("expected NoPoolForAddress, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_without_tag_fails() {
        let address = server().await;
        let router = router(&[address.clone()], vec![address.clone()]);

        let mut loan = router.acquire().await.unwrap();
        loan.clear_origin();
        assert!(matches!(router.release(loan), Err(DriverError::MissingAddressTag(_))));
        assert_eq!(router.pool(&address).unwrap().in_use(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let address = server().await;
        let router = router(&[address.clone()], vec![address.clone()]);

        router.close();
        router.close();
        assert!(router.pool(&address).unwrap().is_closed());
        assert!(matches!(router.acquire().await, Err(DriverError::DriverClosed)));
    }
}
