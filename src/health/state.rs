//! Per-server availability state.
//!
//! # States
//! - Available: server is eligible for selection
//! - Unavailable: last probe failed, server skipped by health-aware selection
//!
//! # Design Decisions
//! - Single writer (the probe loop), many readers (selection)
//! - Plain atomics; readers never block the prober
//! - Servers start available so traffic flows before the first probe lands

use std::sync::atomic::{AtomicBool, Ordering};

use crate::load_balancer::ServerAddress;

/// Availability flag for one server.
#[derive(Debug)]
pub struct ServerHealth {
    address: ServerAddress,
    available: AtomicBool,
}

impl ServerHealth {
    pub fn new(address: ServerAddress) -> Self {
        Self {
            address,
            available: AtomicBool::new(true),
        }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Mark reachable. Returns true if this changed the state.
    pub fn mark_available(&self) -> bool {
        !self.available.swap(true, Ordering::AcqRel)
    }

    /// Mark unreachable. Returns true if this changed the state.
    pub fn mark_unavailable(&self) -> bool {
        self.available.swap(false, Ordering::AcqRel)
    }
}

/// Fixed set of [`ServerHealth`] entries, one per known server, in
/// configuration order.
#[derive(Debug)]
pub struct HealthTable {
    entries: Vec<ServerHealth>,
}

impl HealthTable {
    pub fn new(servers: &[ServerAddress]) -> Self {
        Self {
            entries: servers.iter().cloned().map(ServerHealth::new).collect(),
        }
    }

    pub fn entries(&self) -> &[ServerHealth] {
        &self.entries
    }

    pub fn get(&self, address: &ServerAddress) -> Option<&ServerHealth> {
        self.entries.iter().find(|e| &e.address == address)
    }

    /// Unknown addresses count as available.
    pub fn is_available(&self, address: &ServerAddress) -> bool {
        self.get(address).map_or(true, ServerHealth::is_available)
    }

    pub fn snapshot(&self) -> Vec<(ServerAddress, bool)> {
        self.entries
            .iter()
            .map(|e| (e.address.clone(), e.is_available()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_report_changes() {
        let health = ServerHealth::new(ServerAddress::new("a", 1));
        assert!(health.is_available());

        assert!(health.mark_unavailable());
        assert!(!health.mark_unavailable());
        assert!(!health.is_available());

        assert!(health.mark_available());
        assert!(!health.mark_available());
        assert!(health.is_available());
    }

    #[test]
    fn test_table_lookup() {
        let a = ServerAddress::new("a", 1);
        let b = ServerAddress::new("b", 2);
        let table = HealthTable::new(&[a.clone(), b.clone()]);

        table.get(&b).unwrap().mark_unavailable();
        assert!(table.is_available(&a));
        assert!(!table.is_available(&b));
        assert!(table.is_available(&ServerAddress::new("c", 3)));
        assert_eq!(table.snapshot(), vec![(a, true), (b, false)]);
    }
}
