//! Request dispatch.
//!
//! # Responsibilities
//! - Encode the request with the configured credentials
//! - Borrow a connection, install the call's response handler, write the frame
//! - Arm the per-call timer and wait for the first outcome
//! - Clean the connection and route it back through the router
//!
//! # Design Decisions
//! - The timer is cancelled as soon as the call resolves
//! - The timer also covers the write, so a peer that stops reading cannot
//!   hold the caller past its timeout
//! - Payloads over the frame limit are rejected before a connection is borrowed
//! - Cleanup runs on every path; cleanup failures are logged, never returned
//! - Connections that saw anything other than a well-formed response are closed

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time;

use crate::config::CredentialsConfig;
use crate::dispatch::call::{CallOutcome, PendingCall};
use crate::error::{DriverError, DriverResult};
use crate::net::MAX_FRAME_SIZE;
use crate::observability::metrics;
use crate::pool::Router;
use crate::protocol::{Request, ResponseDecoder};

/// Aborts the timeout task when the call finishes first.
struct TimeoutGuard(JoinHandle<()>);

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    router: Router,
    credentials: CredentialsConfig,
}

impl Dispatcher {
    pub fn new(router: Router, credentials: CredentialsConfig) -> Self {
        Self { router, credentials }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Send `request` and wait for its decoded result.
    pub async fn send<D: ResponseDecoder>(
        &self,
        request: &Request,
        decoder: D,
        timeout: Duration,
    ) -> DriverResult<D::Output> {
        let payload = request
            .encode(&self.credentials)
            .map_err(|e| DriverError::Encode(e.to_string()))?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(DriverError::Encode(format!(
                "request of {} bytes exceeds frame limit of {} bytes",
                payload.len(),
                MAX_FRAME_SIZE
            )));
        }

        let mut loan = self.router.acquire().await?;
        let address = loan.address().clone();
        let start = Instant::now();

        let (call, mut rx) = PendingCall::new(request.request_id(), decoder);
        if loan.install_handler(call.clone()).is_some() {
            tracing::warn!(
                connection_id = %loan.id(),
                server = %address,
                "Replaced a stale response handler"
            );
        }

        let timer = TimeoutGuard(tokio::spawn({
            let call = Arc::clone(&call);
            async move {
                time::sleep(timeout).await;
                call.resolve(CallOutcome::Timeout);
            }
        }));

        let outcome = tokio::select! {
            written = loan.write(payload) => {
                match written {
                    Ok(()) => {
                        call.mark_awaiting();
                    }
                    Err(e) => {
                        call.resolve(CallOutcome::Io(e.to_string()));
                    }
                }
                (&mut rx).await.unwrap_or(CallOutcome::Closed)
            }
            // Resolved mid-write, usually by the timer. The loan is discarded below.
            outcome = &mut rx => outcome.unwrap_or(CallOutcome::Closed),
        };
        drop(timer);

        loan.remove_handler();
        if outcome.is_success() {
            loan.touch();
        }
        if !outcome.connection_reusable() {
            loan.mark_broken();
        }
        let connection_id = loan.id();
        if let Err(e) = self.router.release(loan) {
            tracing::warn!(
                connection_id = %connection_id,
                server = %address,
                error = %e,
                "Failed to release connection"
            );
        }

        metrics::record_call(&address, outcome.label(), start);
        if outcome.is_success() {
            tracing::debug!(
                request_id = %request.request_id(),
                server = %address,
                connection_id = %connection_id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Call completed"
            );
        } else {
            tracing::warn!(
                request_id = %request.request_id(),
                server = %address,
                connection_id = %connection_id,
                outcome = outcome.label(),
                "Call failed"
            );
        }

        outcome.into_result(request.request_id(), &address, timeout)
    }
}
