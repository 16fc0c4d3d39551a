//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Router.acquire()
//!     → health_aware.rs (filter to servers the prober can reach)
//!     → random.rs (uniform choice among the survivors)
//!     → ServerAddress handed back to the router
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless over a fixed server list
//! - Health filtering is a decorator, not a strategy variant
//! - Total outage degrades to "pick anyway" rather than failing

pub mod health_aware;
pub mod random;
pub mod server;

pub use health_aware::HealthAwareLoadBalancer;
pub use random::RandomLoadBalancer;
pub use server::{AddressParseError, ServerAddress};

use crate::error::DriverResult;

/// Server selection strategy.
pub trait LoadBalancer: Send + Sync {
    /// Choose among every known server.
    fn select_server(&self) -> DriverResult<ServerAddress> {
        self.select_from(self.servers())
    }

    /// Choose among `candidates`. Fails with `NoServers` if empty.
    fn select_from(&self, candidates: &[ServerAddress]) -> DriverResult<ServerAddress>;

    /// All servers this balancer knows about.
    fn servers(&self) -> &[ServerAddress];
}
