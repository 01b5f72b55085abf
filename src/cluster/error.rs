//! Cluster error definitions.

use thiserror::Error;

use crate::cluster::proxy::NodeId;
use crate::driver::NativeError;
use crate::membership::TransportError;

/// Errors surfaced to callers of a cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Every replica of the cluster has been deactivated.
    #[error("cluster '{0}' has no live replicas")]
    ClusterExhausted(String),

    /// A replica confirmed alive by its health probe rejected the operation.
    /// The driver error is passed through unchanged.
    #[error(transparent)]
    Application(NativeError),

    /// A Broadcast unit panicked or was cancelled before reporting.
    #[error("dispatch unit failed to report: {reason}")]
    ContractViolation { reason: String },

    #[error("unknown cluster '{0}'")]
    UnknownCluster(String),

    #[error("cluster '{0}' is already registered")]
    DuplicateCluster(String),

    /// The proxied resource was closed.
    #[error("resource {0} is closed")]
    Closed(NodeId),

    #[error("invalid cluster configuration: {0}")]
    InvalidConfig(String),

    #[error("membership transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ClusterError {
    /// The driver error, if this is an application error.
    pub fn application_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ClusterError::Application(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, ClusterError::ClusterExhausted(_))
    }
}

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;
