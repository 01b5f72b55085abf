//! Round-robin balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::LoadBalancer;
use crate::replica::Replica;

/// Round-robin selector.
/// Stores an internal counter to rotate through replicas.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_replica(&self, replicas: &[Replica]) -> Option<Replica> {
        if replicas.is_empty() {
            return None;
        }

        // The slice shrinks as replicas are deactivated; modulo keeps the rotation
        // going over whatever is left.
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % replicas.len();
        Some(replicas[index].clone())
    }
}
