//! Failure classification.
//!
//! A unit failure is either an application error (the replica answered, the
//! caller gets the error) or a sign the replica is gone (deactivate it and
//! carry on without it). The only evidence used is a fresh health probe.

use crate::cluster::registry::{Cluster, DeactivationSource};
use crate::driver::NativeError;
use crate::replica::Replica;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    /// The replica is alive; the error belongs to the caller.
    ApplicationError,
    /// The replica failed its probe.
    ReplicaDead,
}

/// Decides the fate of a replica after one of its units failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureCoordinator;

impl FailureCoordinator {
    pub async fn classify(error: &NativeError, replica: &Replica, cluster: &Cluster) -> FailureVerdict {
        if cluster.health_checker().probe(replica).await {
            tracing::debug!(
                cluster = %cluster.name(),
                replica = %replica,
                error = %error,
                "Replica alive after failure, treating as application error"
            );
            FailureVerdict::ApplicationError
        } else {
            tracing::warn!(
                cluster = %cluster.name(),
                replica = %replica,
                error = %error,
                "Replica failed health probe after operation error"
            );
            FailureVerdict::ReplicaDead
        }
    }

    /// Classify and act: a dead replica is deactivated and `None` is returned,
    /// otherwise the error is handed back to be surfaced.
    pub async fn resolve(cluster: &Cluster, replica: &Replica, error: NativeError) -> Option<NativeError> {
        match Self::classify(&error, replica, cluster).await {
            FailureVerdict::ApplicationError => Some(error),
            FailureVerdict::ReplicaDead => {
                cluster.deactivate_with(replica, DeactivationSource::Dispatch);
                None
            }
        }
    }
}
