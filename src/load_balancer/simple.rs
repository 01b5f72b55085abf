//! Simple balancing strategy: always the heaviest replica.

use crate::load_balancer::LoadBalancer;
use crate::replica::Replica;

/// Picks the replica with the highest weight; configuration order breaks ties.
#[derive(Debug, Default)]
pub struct Simple;

impl Simple {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for Simple {
    fn next_replica(&self, replicas: &[Replica]) -> Option<Replica> {
        let mut best: Option<&Replica> = None;
        for replica in replicas {
            match best {
                Some(b) if b.weight() >= replica.weight() => {}
                _ => best = Some(replica),
            }
        }
        best.cloned()
    }
}
