//! Pending call state and response correlation.
//!
//! # States
//! ```text
//! Sent → Awaiting → { Completed | TimedOut | Failed }
//! ```
//! A call leaves the non-terminal states exactly once. The response frame,
//! the timer, the close event and write failures all race through
//! [`PendingCall::resolve`], and only the first one wins.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{DriverError, DriverResult};
use crate::load_balancer::ServerAddress;
use crate::net::InboundHandler;
use crate::protocol::{ResponseDecoder, Response};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Sent = 0,
    Awaiting = 1,
    Completed = 2,
    TimedOut = 3,
    Failed = 4,
}

impl From<u8> for CallState {
    fn from(val: u8) -> Self {
        match val {
            0 => CallState::Sent,
            1 => CallState::Awaiting,
            2 => CallState::Completed,
            3 => CallState::TimedOut,
            _ => CallState::Failed,
        }
    }
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Completed | CallState::TimedOut | CallState::Failed)
    }
}

/// How a call ended.
#[derive(Debug, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    Timeout,
    /// Envelope or body could not be decoded.
    Decode(String),
    /// Non-success status from the server.
    Status { code: i32, message: String },
    /// Response carried another request's ID.
    Mismatch { actual: String },
    /// Connection closed before a response arrived.
    Closed,
    /// Writing the request failed.
    Io(String),
}

impl<T> CallOutcome<T> {
    pub fn state(&self) -> CallState {
        match self {
            CallOutcome::Success(_) => CallState::Completed,
            CallOutcome::Timeout => CallState::TimedOut,
            _ => CallState::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::Success(_) => "ok",
            CallOutcome::Timeout => "timeout",
            CallOutcome::Decode(_) => "decode",
            CallOutcome::Status { .. } => "status",
            CallOutcome::Mismatch { .. } => "mismatch",
            CallOutcome::Closed => "closed",
            CallOutcome::Io(_) => "io",
        }
    }

    /// Whether the connection may go back to the pool afterwards.
    ///
    /// A status error is a well-formed exchange. Anything else leaves the
    /// stream in an unknown position (a late response may still be in flight)
    /// and the connection is closed.
    pub fn connection_reusable(&self) -> bool {
        matches!(self, CallOutcome::Success(_) | CallOutcome::Status { .. })
    }

    pub fn into_result(self, request_id: &str, address: &ServerAddress, timeout: Duration) -> DriverResult<T> {
        let request_id = request_id.to_string();
        let address = address.clone();
        match self {
            CallOutcome::Success(value) => Ok(value),
            CallOutcome::Timeout => Err(DriverError::Timeout {
                request_id,
                address,
                timeout_ms: timeout.as_millis() as u64,
            }),
            CallOutcome::Decode(reason) => Err(DriverError::Decode {
                request_id,
                address,
                reason,
            }),
            CallOutcome::Status { code, message } => Err(DriverError::Status {
                request_id,
                address,
                code,
                message,
            }),
            CallOutcome::Mismatch { actual } => Err(DriverError::Mismatch {
                address,
                expected: request_id,
                actual,
            }),
            CallOutcome::Closed => Err(DriverError::ConnectionClosed { request_id, address }),
            CallOutcome::Io(reason) => Err(DriverError::Io {
                request_id,
                address,
                reason,
            }),
        }
    }
}

/// Match a response frame to `request_id` and decode its body.
///
/// Checks run in order: envelope, status, request ID, body.
pub fn correlate<D: ResponseDecoder>(request_id: &str, frame: Bytes, decoder: &D) -> CallOutcome<D::Output> {
    let response = match Response::decode(frame) {
        Ok(response) => response,
        Err(e) => return CallOutcome::Decode(e.to_string()),
    };

    if !response.is_success() {
        return CallOutcome::Status {
            code: response.status,
            message: response.message,
        };
    }

    if response.request_id != request_id {
        return CallOutcome::Mismatch {
            actual: response.request_id,
        };
    }

    match decoder.decode(response.body) {
        Ok(value) => CallOutcome::Success(value),
        Err(e) => CallOutcome::Decode(e.to_string()),
    }
}

/// One logical call in flight on a connection.
pub struct PendingCall<D: ResponseDecoder> {
    request_id: String,
    decoder: D,
    state: AtomicU8,
    tx: Mutex<Option<oneshot::Sender<CallOutcome<D::Output>>>>,
}

impl<D: ResponseDecoder> PendingCall<D> {
    pub fn new(request_id: impl Into<String>, decoder: D) -> (Arc<Self>, oneshot::Receiver<CallOutcome<D::Output>>) {
        let (tx, rx) = oneshot::channel();
        let call = Arc::new(Self {
            request_id: request_id.into(),
            decoder,
            state: AtomicU8::new(CallState::Sent as u8),
            tx: Mutex::new(Some(tx)),
        });
        (call, rx)
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn state(&self) -> CallState {
        CallState::from(self.state.load(Ordering::Acquire))
    }

    /// `Sent → Awaiting`. No-op if the call already resolved.
    pub fn mark_awaiting(&self) -> bool {
        self.state
            .compare_exchange(
                CallState::Sent as u8,
                CallState::Awaiting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Resolve the call. Returns false if it had already been resolved.
    pub fn resolve(&self, outcome: CallOutcome<D::Output>) -> bool {
        let target = outcome.state() as u8;
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if CallState::from(current).is_terminal() {
                return false;
            }
            match self
                .state
                .compare_exchange(current, target, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(tx) = tx {
            let _ = tx.send(outcome);
        }
        true
    }
}

impl<D: ResponseDecoder> InboundHandler for PendingCall<D> {
    fn on_frame(&self, frame: Bytes) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            correlate(&self.request_id, frame, &self.decoder)
        }))
        .unwrap_or_else(|_| CallOutcome::Decode("response decoder panicked".to_string()));

        if let CallOutcome::Mismatch { actual } = &outcome {
            tracing::error!(
                request_id = %self.request_id,
                response_id = %actual,
                "Response belongs to another request"
            );
        }
        if !self.resolve(outcome) {
            tracing::debug!(request_id = %self.request_id, "Late response ignored");
        }
    }

    fn on_closed(&self) {
        self.resolve(CallOutcome::Closed);
    }
}
