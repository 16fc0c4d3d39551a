//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Router.acquire()
//!     → LoadBalancer.select_server()
//!     → EndpointPool.acquire() for that address
//!         → permit (bounded) → idle connection + health gate, or hooks.connect()
//!     → loan tagged with its origin address
//!
//! Router.release(loan)
//!     → origin tag → EndpointPool.release()
//!         → hooks.on_release() → idle queue, or close
//! ```
//!
//! # Design Decisions
//! - One pool per server address, built once from configuration
//! - Counters are shared across pools and surfaced as `PoolStats`

pub mod endpoint;
pub mod hooks;
pub mod router;

pub use endpoint::{EndpointPool, PooledConnection};
pub use hooks::{ConnectionHooks, PoolCounters, PoolStats};
pub use router::Router;
