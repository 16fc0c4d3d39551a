//! Bounded connection pool for a single server.
//!
//! # Responsibilities
//! - Bound loans to `max_connections` (semaphore permits)
//! - Bound queued acquirers to `max_pending_acquires`
//! - Reuse idle connections that pass the health gate, most recent first
//! - Create connections on demand through the lifecycle hooks
//!
//! # Design Decisions
//! - A loan holds an owned permit, so the bound holds even if a loan is dropped
//! - Release never fails; unusable connections are closed instead of pooled
//! - Closing is idempotent and wakes every queued acquirer with an error

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time;

use crate::config::{AcquireTimeoutAction, PoolConfig};
use crate::error::{DriverError, DriverResult};
use crate::health::ConnectionHealthChecker;
use crate::load_balancer::ServerAddress;
use crate::net::Connection;
use crate::pool::hooks::ConnectionHooks;

/// A connection on loan from an [`EndpointPool`].
///
/// Dropping it without handing it back closes the connection and frees the
/// slot.
pub struct PooledConnection {
    conn: Option<Connection>,
    permit: Option<OwnedSemaphorePermit>,
    origin: Option<ServerAddress>,
    reusable: bool,
    hooks: Arc<ConnectionHooks>,
}

impl PooledConnection {
    fn new(conn: Connection, permit: OwnedSemaphorePermit, hooks: Arc<ConnectionHooks>) -> Self {
        Self {
            conn: Some(conn),
            permit: Some(permit),
            origin: None,
            reusable: true,
            hooks,
        }
    }

    /// Tag the loan with the pool it must be returned to.
    pub fn set_origin(&mut self, address: ServerAddress) {
        self.origin = Some(address);
    }

    pub fn origin(&self) -> Option<&ServerAddress> {
        self.origin.as_ref()
    }

    pub(crate) fn clear_origin(&mut self) -> Option<ServerAddress> {
        self.origin.take()
    }

    /// Close the connection at release instead of pooling it.
    pub fn mark_broken(&mut self) {
        self.reusable = false;
    }

    fn into_parts(mut self) -> Option<(Connection, OwnedSemaphorePermit, bool)> {
        let conn = self.conn.take()?;
        let permit = self.permit.take()?;
        Some((conn, permit, self.reusable))
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `into_parts` and `drop` empty the slot, and both consume the loan.
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken from live loan"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!(
                connection_id = %conn.id(),
                server = %conn.address(),
                "Loan dropped without release, closing connection"
            );
            self.hooks.on_release(&conn);
            conn.close();
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .field("origin", &self.origin)
            .field("reusable", &self.reusable)
            .finish()
    }
}

/// Decrements the pending-acquire count when the waiter leaves the queue.
struct PendingSlot<'a>(&'a AtomicUsize);

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub struct EndpointPool {
    address: ServerAddress,
    config: PoolConfig,
    hooks: Arc<ConnectionHooks>,
    checker: ConnectionHealthChecker,
    idle: Mutex<VecDeque<Connection>>,
    permits: Arc<Semaphore>,
    pending: AtomicUsize,
    closed: AtomicBool,
}

impl EndpointPool {
    pub fn new(
        address: ServerAddress,
        config: PoolConfig,
        hooks: Arc<ConnectionHooks>,
        checker: ConnectionHealthChecker,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_connections));
        Self {
            address,
            config,
            hooks,
            checker,
            idle: Mutex::new(VecDeque::new()),
            permits,
            pending: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Connections currently on loan.
    pub fn in_use(&self) -> usize {
        self.config.max_connections - self.permits.available_permits()
    }

    pub fn idle_count(&self) -> usize {
        self.idle_queue().len()
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn idle_queue(&self) -> MutexGuard<'_, VecDeque<Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrow a healthy connection, creating one if no idle connection passes
    /// the health gate.
    pub async fn acquire(&self) -> DriverResult<PooledConnection> {
        if self.is_closed() {
            return Err(DriverError::PoolClosed(self.address.clone()));
        }

        let permit = self.acquire_permit().await?;

        let conn = loop {
            let candidate = self.idle_queue().pop_back();
            match candidate {
                Some(conn) => {
                    if self.checker.is_healthy(&conn).await && self.hooks.on_acquire(&conn) {
                        break conn;
                    }
                    tracing::debug!(
                        connection_id = %conn.id(),
                        server = %self.address,
                        "Discarding connection that failed health check"
                    );
                    conn.close();
                }
                None => {
                    let conn = self
                        .hooks
                        .connect(&self.address, self.config.connect_timeout())
                        .await?;
                    if self.hooks.on_acquire(&conn) {
                        break conn;
                    }
                    conn.close();
                }
            }
        };

        Ok(PooledConnection::new(conn, permit, self.hooks.clone()))
    }

    async fn acquire_permit(&self) -> DriverResult<OwnedSemaphorePermit> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(DriverError::PoolClosed(self.address.clone())),
            Err(TryAcquireError::NoPermits) => {}
        }

        let already_pending = self.pending.fetch_add(1, Ordering::AcqRel);
        let _slot = PendingSlot(&self.pending);
        if already_pending >= self.config.max_pending_acquires {
            tracing::warn!(
                server = %self.address,
                pending = already_pending,
                "Pending acquire limit reached"
            );
            return Err(DriverError::PendingLimitReached {
                address: self.address.clone(),
                pending: already_pending,
            });
        }

        let start = Instant::now();
        let timeout = self.config.acquire_timeout();
        let acquired = match time::timeout(timeout, self.permits.clone().acquire_owned()).await {
            Ok(acquired) => acquired,
            Err(_) => match self.config.acquire_timeout_action {
                AcquireTimeoutAction::Fail => {
                    return Err(DriverError::PoolExhausted {
                        address: self.address.clone(),
                        waited_ms: start.elapsed().as_millis() as u64,
                    });
                }
                AcquireTimeoutAction::Wait => {
                    tracing::warn!(
                        server = %self.address,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "Acquire timeout elapsed, still waiting for a connection"
                    );
                    self.permits.clone().acquire_owned().await
                }
            },
        };
        acquired.map_err(|_| DriverError::PoolClosed(self.address.clone()))
    }

    /// Hand a loan back. Never fails; connections that cannot be reused are
    /// closed.
    pub fn release(&self, loan: PooledConnection) {
        let Some((conn, permit, reusable)) = loan.into_parts() else {
            return;
        };
        self.hooks.on_release(&conn);

        if reusable && conn.is_open() && !self.is_closed() {
            self.idle_queue().push_back(conn);
        } else {
            tracing::debug!(
                connection_id = %conn.id(),
                server = %self.address,
                reusable,
                "Closing released connection"
            );
            conn.close();
        }
        drop(permit);
    }

    /// Close the pool. Idle connections are closed now, loaned ones when they
    /// come back.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.permits.close();
        let drained: Vec<Connection> = self.idle_queue().drain(..).collect();
        for conn in &drained {
            conn.close();
        }
        tracing::debug!(server = %self.address, closed = drained.len(), "Pool closed");
    }
}
