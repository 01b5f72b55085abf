//! Replica liveness probe.
//!
//! # Responsibilities
//! - Open an independent session to a replica
//! - Run the cluster's validation statement
//! - Report alive/dead, never an error

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::driver::{Connector, NativeError};
use crate::observability::metrics;
use crate::replica::Replica;

/// Probes replicas of one cluster.
pub struct HealthChecker {
    cluster: String,
    connector: Arc<dyn Connector>,
    validation_statement: String,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        cluster: impl Into<String>,
        connector: Arc<dyn Connector>,
        validation_statement: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            connector,
            validation_statement: validation_statement.into(),
            timeout,
        }
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn validation_statement(&self) -> &str {
        &self.validation_statement
    }

    /// Returns true iff a fresh session could run the validation statement
    /// within the probe timeout. Every failure mode collapses to `false`.
    pub async fn probe(&self, replica: &Replica) -> bool {
        let alive = match time::timeout(self.timeout, self.validate(replica)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(
                    cluster = %self.cluster,
                    replica = %replica,
                    error = %e,
                    "Health probe failed"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    cluster = %self.cluster,
                    replica = %replica,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Health probe timed out"
                );
                false
            }
        };

        metrics::record_probe(&self.cluster, replica.id().as_str(), alive);
        alive
    }

    async fn validate(&self, replica: &Replica) -> Result<(), NativeError> {
        let session = self.connector.connect(replica).await?;
        let result = session.execute(&self.validation_statement).await.map(|_| ());

        if let Err(e) = session.close().await {
            tracing::debug!(replica = %replica, error = %e, "Failed to close probe session");
        }
        result
    }
}

impl fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthChecker")
            .field("cluster", &self.cluster)
            .field("validation_statement", &self.validation_statement)
            .field("timeout", &self.timeout)
            .finish()
    }
}
