//! Driver error taxonomy.
//!
//! Every failure a caller can observe is a [`DriverError`] variant carrying
//! enough context (request ID, server address, status code) to log and alert
//! on. Wire-level failures have their own types in [`crate::net::frame`] and
//! [`crate::protocol`] and are folded into these variants at the call site.

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::load_balancer::ServerAddress;

/// Errors returned by the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// No connection became available within the acquire timeout.
    #[error("connection pool for {address} exhausted (waited {waited_ms} ms)")]
    PoolExhausted { address: ServerAddress, waited_ms: u64 },

    /// Too many callers are already queued for a connection.
    #[error("connection pool for {address} exhausted: {pending} acquisitions already pending")]
    PendingLimitReached { address: ServerAddress, pending: usize },

    /// The pool was closed while (or before) acquiring.
    #[error("connection pool for {0} is closed")]
    PoolClosed(ServerAddress),

    /// The load balancer was asked to choose from an empty list.
    #[error("no servers available for selection")]
    NoServers,

    /// The load balancer returned an address the router has no pool for.
    #[error("no connection pool registered for {0}")]
    NoPoolForAddress(ServerAddress),

    /// A connection was handed back without its origin address tag.
    #[error("connection {0} released without an origin address tag")]
    MissingAddressTag(String),

    /// TCP connect failed.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: ServerAddress,
        #[source]
        source: std::io::Error,
    },

    /// TCP connect did not complete in time.
    #[error("connect to {address} timed out after {timeout_ms} ms")]
    ConnectTimeout { address: ServerAddress, timeout_ms: u64 },

    /// No response arrived before the call deadline.
    #[error("request {request_id} to {address} timed out after {timeout_ms} ms")]
    Timeout {
        request_id: String,
        address: ServerAddress,
        timeout_ms: u64,
    },

    /// The response frame or its body could not be decoded.
    #[error("failed to decode response to {request_id} from {address}: {reason}")]
    Decode {
        request_id: String,
        address: ServerAddress,
        reason: String,
    },

    /// The server answered with a non-success status code.
    #[error("request {request_id} to {address} failed with status {code}: {message}")]
    Status {
        request_id: String,
        address: ServerAddress,
        code: i32,
        message: String,
    },

    /// The response belongs to a different request (connection cross-talk).
    #[error("response from {address} carries request id {actual}, expected {expected}")]
    Mismatch {
        address: ServerAddress,
        expected: String,
        actual: String,
    },

    /// The connection closed before a response arrived.
    #[error("connection to {address} closed before response to {request_id}")]
    ConnectionClosed {
        request_id: String,
        address: ServerAddress,
    },

    /// Writing the request failed.
    #[error("I/O error on request {request_id} to {address}: {reason}")]
    Io {
        request_id: String,
        address: ServerAddress,
        reason: String,
    },

    /// The request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(String),

    /// The driver has been closed.
    #[error("driver is closed")]
    DriverClosed,

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DriverError {
    /// Whether the caller may reasonably retry the same request.
    ///
    /// Only overload and timeout are reported as retryable. The driver itself
    /// never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::PoolExhausted { .. }
                | DriverError::PendingLimitReached { .. }
                | DriverError::Timeout { .. }
        )
    }

    /// Short, stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DriverError::PoolExhausted { .. } | DriverError::PendingLimitReached { .. } => {
                "pool_exhausted"
            }
            DriverError::PoolClosed(_) => "pool_closed",
            DriverError::NoServers => "no_servers",
            DriverError::NoPoolForAddress(_) => "no_pool",
            DriverError::MissingAddressTag(_) => "missing_tag",
            DriverError::Connect { .. } => "connect",
            DriverError::ConnectTimeout { .. } => "connect_timeout",
            DriverError::Timeout { .. } => "timeout",
            DriverError::Decode { .. } => "decode",
            DriverError::Status { .. } => "status",
            DriverError::Mismatch { .. } => "mismatch",
            DriverError::ConnectionClosed { .. } => "closed",
            DriverError::Io { .. } => "io",
            DriverError::Encode(_) => "encode",
            DriverError::DriverClosed => "driver_closed",
            DriverError::Config(_) => "config",
        }
    }
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
