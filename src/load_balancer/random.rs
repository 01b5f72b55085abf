//! Weighted random balancing strategy.

use crate::load_balancer::LoadBalancer;
use crate::replica::Replica;

/// Picks a replica at random, proportionally to its weight.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for WeightedRandom {
    fn next_replica(&self, replicas: &[Replica]) -> Option<Replica> {
        let total: u64 = replicas.iter().map(|r| u64::from(r.weight())).sum();
        if total == 0 {
            return replicas.first().cloned();
        }

        let mut ticket = fastrand::u64(0..total);
        for replica in replicas {
            let weight = u64::from(replica.weight());
            if ticket < weight {
                return Some(replica.clone());
            }
            ticket -= weight;
        }
        None
    }
}
