//! Cluster registry of a process.
//!
//! # Responsibilities
//! - Own every configured cluster, keyed by name
//! - Start the membership notifier (local or distributed)
//! - Apply deactivations announced by other processes
//!
//! # Design Decisions
//! - Announcements for a cluster that is not registered yet are kept and applied
//!   when the cluster is added, so the subscription may start before loading

use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::cluster::error::{ClusterError, ClusterResult};
use crate::cluster::registry::Cluster;
use crate::config::ClusterConfig;
use crate::driver::Connector;
use crate::membership::{
    DistributedMembership, LocalMembership, Membership, MembershipEvent, MembershipNotifier, PayloadHandler,
};
use crate::replica::ReplicaId;

/// Manages the clusters of one process.
pub struct ClusterManager {
    clusters: DashMap<String, Arc<Cluster>>,
    /// Remote deactivations for clusters not added yet.
    pending: DashMap<String, Vec<ReplicaId>>,
    notifier: Arc<dyn MembershipNotifier>,
    origin: Uuid,
}

impl ClusterManager {
    /// Start a manager. Distributed membership subscribes to the transport
    /// before returning, so no announcement published afterwards is missed,
    /// including those for clusters loaded later.
    pub async fn start(membership: Membership) -> ClusterResult<Arc<Self>> {
        let origin = Uuid::new_v4();

        match membership {
            Membership::Local => Ok(Self::with_notifier(origin, Arc::new(LocalMembership))),
            Membership::Distributed { transport, topic } => {
                let notifier = DistributedMembership::spawn(origin, Arc::clone(&transport), topic.clone());
                let manager = Self::with_notifier(origin, Arc::new(notifier));

                let weak: Weak<ClusterManager> = Arc::downgrade(&manager);
                let handler: PayloadHandler = Arc::new(move |payload: Vec<u8>| {
                    let manager = match weak.upgrade() {
                        Some(manager) => manager,
                        None => return,
                    };
                    match serde_json::from_slice::<MembershipEvent>(&payload) {
                        Ok(event) => {
                            manager.apply_remote(&event);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Discarding malformed membership event");
                        }
                    }
                });
                transport.subscribe(&topic, handler).await?;

                tracing::info!(origin = %origin, topic = %topic, "Distributed membership started");
                Ok(manager)
            }
        }
    }

    /// A manager whose deactivations stay in this process.
    pub fn local() -> Arc<Self> {
        Self::with_notifier(Uuid::new_v4(), Arc::new(LocalMembership))
    }

    fn with_notifier(origin: Uuid, notifier: Arc<dyn MembershipNotifier>) -> Arc<Self> {
        Arc::new(Self {
            clusters: DashMap::new(),
            pending: DashMap::new(),
            notifier,
            origin,
        })
    }

    /// Identifier stamped on every announcement this process publishes.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn add_cluster(&self, config: &ClusterConfig, connector: Arc<dyn Connector>) -> ClusterResult<Arc<Cluster>> {
        match self.clusters.entry(config.name.clone()) {
            Entry::Occupied(_) => Err(ClusterError::DuplicateCluster(config.name.clone())),
            Entry::Vacant(vacant) => {
                let cluster = Arc::new(Cluster::from_config(config, connector, Arc::clone(&self.notifier))?);
                // Taken while the entry is held, so apply_remote cannot defer in between.
                let deferred = self.pending.remove(&config.name).map(|(_, ids)| ids).unwrap_or_default();
                vacant.insert(Arc::clone(&cluster));

                for id in deferred {
                    if cluster.deactivate_remote(&id) {
                        tracing::info!(cluster = %cluster.name(), replica = %id, "Applied deferred remote deactivation");
                    }
                }
                Ok(cluster)
            }
        }
    }

    /// Register every cluster in `configs`, asking `connector_for` for each driver.
    pub fn load<F>(&self, configs: &[ClusterConfig], mut connector_for: F) -> ClusterResult<()>
    where
        F: FnMut(&ClusterConfig) -> Arc<dyn Connector>,
    {
        for config in configs {
            let connector = connector_for(config);
            self.add_cluster(config, connector)?;
        }
        tracing::info!(clusters = self.clusters.len(), "Clusters loaded");
        Ok(())
    }

    pub fn get_cluster(&self, name: &str) -> ClusterResult<Arc<Cluster>> {
        self.clusters
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| ClusterError::UnknownCluster(name.to_string()))
    }

    /// All clusters, sorted by name.
    pub fn clusters(&self) -> Vec<Arc<Cluster>> {
        let mut clusters: Vec<Arc<Cluster>> = self.clusters.iter().map(|c| Arc::clone(c.value())).collect();
        clusters.sort_by(|a, b| a.name().cmp(b.name()));
        clusters
    }

    /// Apply an announcement from another process. Own announcements and
    /// unknown replicas are ignored. Announcements for a cluster that is not
    /// registered yet are deferred until [`ClusterManager::add_cluster`].
    ///
    /// Returns true if a live replica was deactivated now.
    pub fn apply_remote(&self, event: &MembershipEvent) -> bool {
        if event.origin == self.origin {
            return false;
        }
        let cluster = match self.clusters.entry(event.cluster.clone()) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                let mut deferred = self.pending.entry(event.cluster.clone()).or_default();
                if !deferred.contains(&event.replica) {
                    deferred.push(event.replica.clone());
                }
                drop(deferred);
                drop(vacant);
                tracing::debug!(
                    cluster = %event.cluster,
                    replica = %event.replica,
                    "Membership event for a cluster not loaded yet, deferring"
                );
                return false;
            }
        };

        let applied = cluster.deactivate_remote(&event.replica);
        if applied {
            tracing::info!(
                cluster = %event.cluster,
                replica = %event.replica,
                origin = %event.origin,
                "Applied remote deactivation"
            );
        }
        applied
    }
}

impl fmt::Debug for ClusterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.clusters().iter().map(|c| c.name().to_string()).collect();
        f.debug_struct("ClusterManager")
            .field("origin", &self.origin)
            .field("clusters", &names)
            .field("notifier", &self.notifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplicaConfig;
    use crate::driver::{NativeError, Session};
    use crate::replica::{Replica, ReplicaId};
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(&self, _replica: &Replica) -> Result<Box<dyn Session>, NativeError> {
            Err("unreachable".into())
        }
    }

    fn config(name: &str) -> ClusterConfig {
        ClusterConfig::new(
            name,
            vec![ReplicaConfig::new("a", "mock://a"), ReplicaConfig::new("b", "mock://b")],
        )
    }

    #[test]
    fn rejects_duplicate_cluster() {
        let manager = ClusterManager::local();
        manager.add_cluster(&config("orders"), Arc::new(Unreachable)).unwrap();
        let err = manager.add_cluster(&config("orders"), Arc::new(Unreachable)).unwrap_err();
        assert!(matches!(err, ClusterError::DuplicateCluster(name) if name == "orders"));
    }

    #[test]
    fn unknown_cluster_lookup_fails() {
        let manager = ClusterManager::local();
        assert!(matches!(
            manager.get_cluster("missing"),
            Err(ClusterError::UnknownCluster(_))
        ));
    }

    #[test]
    fn clusters_are_sorted_by_name() {
        let manager = ClusterManager::local();
        manager
            .load(&[config("users"), config("billing")], |_| Arc::new(Unreachable) as Arc<dyn Connector>)
            .unwrap();
        let names: Vec<_> = manager.clusters().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["billing", "users"]);
    }

    #[test]
    fn own_events_are_ignored() {
        let manager = ClusterManager::local();
        manager.add_cluster(&config("orders"), Arc::new(Unreachable)).unwrap();

        let own = MembershipEvent::new(manager.origin(), "orders", ReplicaId::from("a"));
        assert!(!manager.apply_remote(&own));

        let foreign = MembershipEvent::new(Uuid::new_v4(), "orders", ReplicaId::from("a"));
        assert!(manager.apply_remote(&foreign));
        assert!(!manager.apply_remote(&foreign));
        assert_eq!(manager.get_cluster("orders").unwrap().live_replicas().len(), 1);
    }

    #[test]
    fn events_for_clusters_added_later_are_applied_on_add() {
        let manager = ClusterManager::local();
        let peer = Uuid::new_v4();

        assert!(!manager.apply_remote(&MembershipEvent::new(peer, "orders", ReplicaId::from("b"))));
        assert!(!manager.apply_remote(&MembershipEvent::new(peer, "orders", ReplicaId::from("b"))));
        assert!(!manager.apply_remote(&MembershipEvent::new(peer, "orders", ReplicaId::from("zz"))));

        let cluster = manager.add_cluster(&config("orders"), Arc::new(Unreachable)).unwrap();
        assert_eq!(cluster.live_replicas().ids(), vec![ReplicaId::from("a")]);
        assert_eq!(cluster.deactivated_replicas().len(), 1);

        // Deferred events are consumed once.
        let other = manager.add_cluster(&config("billing"), Arc::new(Unreachable)).unwrap();
        assert_eq!(other.live_replicas().len(), 2);
    }
}
