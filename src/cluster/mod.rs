//! Replicated cluster core.
//!
//! # Data Flow
//! ```text
//! ProxyNode::invoke(mode, operation)
//!     → Cluster::dispatch (dispatch.rs)
//!         → live snapshot (registry.rs)
//!         → unit per replica, handle from ResourceMap (resources.rs)
//!         → on failure: FailureCoordinator (failure.rs)
//!             → HealthChecker probe
//!             → dead: Cluster::deactivate_with
//!                 → cascade through ProxyNode tree (proxy.rs)
//!                 → MembershipNotifier::announce
//!             → alive: error surfaced to the caller
//! ```
//!
//! # Design Decisions
//! - The live set only ever shrinks
//! - The cluster never guesses from error contents; a failed probe is the only
//!   evidence of a dead replica

pub mod dispatch;
pub mod error;
pub mod failure;
pub mod manager;
pub mod proxy;
pub mod registry;
pub mod resources;

pub use dispatch::{DispatchMode, Outcome};
pub use error::{ClusterError, ClusterResult};
pub use failure::{FailureCoordinator, FailureVerdict};
pub use manager::ClusterManager;
pub use proxy::{NodeId, Population, ProxyNode};
pub use registry::{Cluster, DeactivationSource};
pub use resources::{HandleFactory, ResourceMap};
