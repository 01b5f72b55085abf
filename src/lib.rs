//! Replicated database proxy library.
//!
//! Presents a cluster of identical database replicas as one logical database:
//! writes are broadcast to every live replica, reads go to one balancer-chosen
//! replica, and a replica whose failure is confirmed by a health probe is
//! removed from the cluster, from every open resource, and from every peer
//! process sharing the cluster.

pub mod admin;
pub mod cluster;
pub mod config;
pub mod driver;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod membership;
pub mod observability;
pub mod replica;
pub mod resilience;

pub use cluster::{
    Cluster, ClusterError, ClusterManager, ClusterResult, DispatchMode, Outcome, Population, ProxyNode,
};
pub use config::ReplicationConfig;
pub use driver::{Connector, NativeError, NativeHandle, Session};
pub use lifecycle::Shutdown;
pub use membership::{Membership, MembershipNotifier};
pub use replica::{Replica, ReplicaId, ReplicaSet};
