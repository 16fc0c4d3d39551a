//! Uniform random load balancing strategy.

use rand::seq::SliceRandom;

use crate::error::{DriverError, DriverResult};
use crate::load_balancer::{LoadBalancer, ServerAddress};

/// Random selector.
/// Picks uniformly among the candidates, with no weighting.
#[derive(Debug, Clone)]
pub struct RandomLoadBalancer {
    servers: Vec<ServerAddress>,
}

impl RandomLoadBalancer {
    pub fn new(servers: Vec<ServerAddress>) -> Self {
        Self { servers }
    }
}

impl LoadBalancer for RandomLoadBalancer {
    fn select_from(&self, candidates: &[ServerAddress]) -> DriverResult<ServerAddress> {
        candidates
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(DriverError::NoServers)
    }

    fn servers(&self) -> &[ServerAddress] {
        &self.servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_covers_all_servers() {
        let servers = vec![
            ServerAddress::new("127.0.0.1", 8080),
            ServerAddress::new("127.0.0.1", 8081),
            ServerAddress::new("127.0.0.1", 8082),
        ];
        let lb = RandomLoadBalancer::new(servers.clone());

        let mut seen = HashSet::new();
        for _ in 0..500 {
            let picked = lb.select_server().unwrap();
            assert!(servers.contains(&picked));
            seen.insert(picked);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_select_from_restricts_to_candidates() {
        let lb = RandomLoadBalancer::new(vec![
            ServerAddress::new("a", 1),
            ServerAddress::new("b", 2),
        ]);
        let only = [ServerAddress::new("b", 2)];
        for _ in 0..20 {
            assert_eq!(lb.select_from(&only).unwrap(), only[0]);
        }
    }

    #[test]
    fn test_empty_list_fails() {
        let lb = RandomLoadBalancer::new(Vec::new());
        assert!(matches!(lb.select_server(), Err(DriverError::NoServers)));
        assert!(matches!(lb.select_from(&[]), Err(DriverError::NoServers)));
    }
}
