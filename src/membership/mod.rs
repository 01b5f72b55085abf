//! Cluster membership propagation.
//!
//! # Data Flow
//! ```text
//! Local deactivation (Cluster::deactivate_with)
//!     → MembershipNotifier::announce
//!         → local.rs: nothing
//!         → distributed.rs: queue → publisher task → Transport::publish
//!
//! Transport subscription (ClusterManager::start)
//!     → decode MembershipEvent
//!     → skip own origin
//!     → Cluster::deactivate_remote (never re-announced)
//! ```
//!
//! # Design Decisions
//! - Announcing never blocks the critical section and never fails a dispatch
//! - Delivery is at-least-once; deactivation is idempotent so duplicates are harmless

pub mod distributed;
pub mod transport;

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::replica::{Replica, ReplicaId};

pub use distributed::DistributedMembership;
pub use transport::memory::MemoryBus;
pub use transport::tcp::{TcpTransport, TcpTransportConfig};
pub use transport::{PayloadHandler, Transport, TransportError};

/// Default topic for membership announcements.
pub const MEMBERSHIP_TOPIC: &str = "replica-proxy.membership";

/// A replica deactivated by the process identified by `origin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub origin: Uuid,
    pub cluster: String,
    pub replica: ReplicaId,
}

impl MembershipEvent {
    pub fn new(origin: Uuid, cluster: impl Into<String>, replica: ReplicaId) -> Self {
        Self {
            origin,
            cluster: cluster.into(),
            replica,
        }
    }
}

/// Receives every local deactivation exactly once.
pub trait MembershipNotifier: Send + Sync + Debug {
    fn announce(&self, cluster: &str, replica: &Replica);
}

/// Notifier for a single process: deactivations stay local.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMembership;

impl MembershipNotifier for LocalMembership {
    fn announce(&self, cluster: &str, replica: &Replica) {
        tracing::trace!(cluster = %cluster, replica = %replica, "Local membership, announcement not propagated");
    }
}

/// How a [`ClusterManager`](crate::cluster::ClusterManager) propagates deactivations.
#[derive(Clone)]
pub enum Membership {
    Local,
    Distributed {
        transport: Arc<dyn Transport>,
        topic: String,
    },
}

impl Membership {
    pub fn distributed(transport: Arc<dyn Transport>) -> Self {
        Membership::Distributed {
            transport,
            topic: MEMBERSHIP_TOPIC.to_string(),
        }
    }
}

impl Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Membership::Local => f.write_str("Local"),
            Membership::Distributed { topic, .. } => f.debug_struct("Distributed").field("topic", topic).finish(),
        }
    }
}
