//! Background health monitoring.
//!
//! # Responsibilities
//! - Periodically probe every live replica of every cluster
//! - Deactivate replicas after consecutive failed probes

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::cluster::{ClusterManager, DeactivationSource};
use crate::config::HealthMonitorConfig;
use crate::replica::ReplicaId;

pub struct HealthMonitor {
    manager: Arc<ClusterManager>,
    config: HealthMonitorConfig,
    failures: DashMap<(String, ReplicaId), u32>,
}

impl HealthMonitor {
    pub fn new(manager: Arc<ClusterManager>, config: HealthMonitorConfig) -> Self {
        Self {
            manager,
            config,
            failures: DashMap::new(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Background health monitor disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            threshold = self.config.failure_threshold,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every live replica once. Returns the number of replicas deactivated.
    pub async fn check_all(&self) -> usize {
        let mut deactivated = 0;

        for cluster in self.manager.clusters() {
            let live = cluster.live_replicas();
            for replica in live.iter() {
                let key = (cluster.name().to_string(), replica.id().clone());

                if cluster.health_checker().probe(replica).await {
                    self.failures.remove(&key);
                    continue;
                }

                let failures = {
                    let mut count = self.failures.entry(key.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                tracing::debug!(
                    cluster = %cluster.name(),
                    replica = %replica,
                    failures,
                    threshold = self.config.failure_threshold,
                    "Replica failed background probe"
                );

                if failures >= self.config.failure_threshold {
                    self.failures.remove(&key);
                    if cluster.deactivate_with(replica, DeactivationSource::Monitor) {
                        deactivated += 1;
                    }
                }
            }
        }
        deactivated
    }
}
