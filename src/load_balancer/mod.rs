//! Read balancing subsystem.
//!
//! # Data Flow
//! ```text
//! SelectOne dispatch
//!     → live replicas usable by the resource map
//!     → Apply balancing algorithm:
//!         - simple.rs (highest weight, configuration order on ties)
//!         - round_robin.rs (rotate through replicas)
//!         - random.rs (weighted random pick)
//!         - least_busy.rs (fewest in-flight reads per weight)
//!     → LoadGuard held while the operation runs
//! ```
//!
//! # Design Decisions
//! - Balancers only see live replicas; deactivated ones never reach them
//! - One balancer per cluster, selected by configuration
//! - Load tracking lives in the balancer, replicas stay immutable

pub mod least_busy;
pub mod random;
pub mod round_robin;
pub mod simple;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::replica::Replica;

pub use least_busy::LeastBusy;
pub use random::WeightedRandom;
pub use round_robin::RoundRobin;
pub use simple::Simple;

/// Strategy choosing the replica that serves a SelectOne call.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Pick one of `replicas`, or `None` if the slice is empty.
    fn next_replica(&self, replicas: &[Replica]) -> Option<Replica>;

    /// Called before an operation starts on `replica`.
    fn begin(&self, _replica: &Replica) {}

    /// Called once the operation on `replica` has finished.
    fn end(&self, _replica: &Replica) {}
}

/// Configured balancing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalancerKind {
    Simple,
    #[default]
    RoundRobin,
    Random,
    LeastBusy,
}

impl BalancerKind {
    pub fn build(self) -> Box<dyn LoadBalancer> {
        match self {
            BalancerKind::Simple => Box::new(Simple::new()),
            BalancerKind::RoundRobin => Box::new(RoundRobin::new()),
            BalancerKind::Random => Box::new(WeightedRandom::new()),
            BalancerKind::LeastBusy => Box::new(LeastBusy::new()),
        }
    }
}

/// RAII guard bracketing one operation on a replica.
pub struct LoadGuard<'a> {
    balancer: &'a dyn LoadBalancer,
    replica: Replica,
}

impl<'a> LoadGuard<'a> {
    pub fn new(balancer: &'a dyn LoadBalancer, replica: Replica) -> Self {
        balancer.begin(&replica);
        Self { balancer, replica }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.balancer.end(&self.replica);
    }
}
