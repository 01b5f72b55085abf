//! Replica registry subsystem.
//!
//! # Data Flow
//! ```text
//! [[clusters.replicas]] config entries
//!     → identity.rs (Replica: id + connection parameters)
//!     → set.rs (ReplicaSet: ordered live replicas of one cluster)
//!     → published by the Cluster through ArcSwap snapshots
//!
//! On deactivation:
//!     ReplicaSet::without(replica) → new snapshot swapped in
//! ```
//!
//! # Design Decisions
//! - Replicas are immutable and compared by id only
//! - A ReplicaSet is a value; removal produces a new set (never re-adds)
//! - Configuration order is preserved; the first live replica is the Direct target

pub mod identity;
pub mod set;

pub use identity::{Replica, ReplicaId};
pub use set::ReplicaSet;
