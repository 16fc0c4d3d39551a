//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Server probing (active.rs):
//!     Periodic timer
//!     → Connect-and-close each server
//!     → Update state.rs
//!
//! Connection gate (connection.rs):
//!     Pool acquire
//!     → Open? idle within limit? optional ping
//!     → Hand out, or discard and try the next one
//!
//! State (state.rs):
//!     Available ←→ Unavailable
//! ```
//!
//! # Design Decisions
//! - Server health and connection health are separate concerns
//! - Server health is per-address, shared by the selector
//! - Connection health is checked lazily, on acquire

pub mod active;
pub mod connection;
pub mod state;

pub use active::ServerProber;
pub use connection::ConnectionHealthChecker;
pub use state::{HealthTable, ServerHealth};
