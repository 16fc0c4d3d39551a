//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     close() → trigger broadcast → background tasks exit their loops
//!     → owner waits a bounded grace period → abort stragglers
//! ```
//!
//! # Design Decisions
//! - Triggering is idempotent: only the first call broadcasts
//! - Shutdown has timeout: forced abort after the grace period

pub mod shutdown;

pub use shutdown::Shutdown;
