//! Least-busy balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::load_balancer::LoadBalancer;
use crate::replica::{Replica, ReplicaId};

/// Selects the replica with the fewest in-flight reads relative to its weight.
#[derive(Debug, Default)]
pub struct LeastBusy {
    in_flight: DashMap<ReplicaId, AtomicUsize>,
}

impl LeastBusy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of in-flight operations on `replica`.
    pub fn load(&self, replica: &Replica) -> usize {
        self.in_flight
            .get(replica.id())
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl LoadBalancer for LeastBusy {
    fn next_replica(&self, replicas: &[Replica]) -> Option<Replica> {
        // Compare load/weight without floats: a/wa < b/wb  <=>  a*wb < b*wa.
        // min_by keeps the first on ties (stability).
        replicas
            .iter()
            .min_by(|a, b| {
                let la = self.load(a) as u64 * u64::from(b.weight().max(1));
                let lb = self.load(b) as u64 * u64::from(a.weight().max(1));
                la.cmp(&lb)
            })
            .cloned()
    }

    fn begin(&self, replica: &Replica) {
        self.in_flight
            .entry(replica.id().clone())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    fn end(&self, replica: &Replica) {
        if let Some(counter) = self.in_flight.get(replica.id()) {
            let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        }
    }
}
