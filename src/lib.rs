//! Resilient RPC client driver for a replicated graph database.
//!
//! # Architecture Overview
//!
//! ```text
//!                ┌──────────────────────────────────────────────────────────┐
//!                │                         DRIVER                           │
//!                │                                                          │
//!   Caller       │  ┌──────────┐    ┌──────────┐    ┌──────────────────┐    │
//!   send() ──────┼─▶│ dispatch │───▶│  router  │───▶│  load_balancer   │    │
//!                │  │ (calls)  │    │  (pool)  │    │ random + health  │    │
//!                │  └────┬─────┘    └────┬─────┘    └────────┬─────────┘    │
//!                │       │               │                   │              │
//!                │       │               ▼                   ▼              │
//!                │       │        ┌──────────────┐    ┌──────────────┐      │
//!                │       │        │ endpoint pool│    │ server prober│      │
//!                │       │        │ + health gate│    │  (background)│      │
//!                │       │        └──────┬───────┘    └──────────────┘      │
//!                │       ▼               ▼                                  │
//!   Result ◀─────┼── correlate ◀── connection I/O task ◀── frame codec ◀────┼── Graph
//!                │                 (+ idle reaper)                          │   server
//!                │                                                          │
//!                │  ┌────────────────────────────────────────────────────┐  │
//!                │  │ config · error · observability · lifecycle          │  │
//!                │  └────────────────────────────────────────────────────┘  │
//!                └──────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod net;
pub mod protocol;

// Traffic management
pub mod dispatch;
pub mod health;
pub mod load_balancer;
pub mod pool;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

mod driver;

pub use config::{load_config, DriverConfig};
pub use driver::Driver;
pub use error::{DriverError, DriverResult};
pub use load_balancer::ServerAddress;
pub use pool::PoolStats;
pub use protocol::{DecodeError, JsonDecoder, RawDecoder, Request, ResponseDecoder};
