//! Replica registry of one cluster.
//!
//! # Responsibilities
//! - Hold the live replica set as an immutable snapshot
//! - Deactivate replicas exactly once, cascading into every open resource
//! - Announce local deactivations to the membership notifier
//!
//! # Design Decisions
//! - Readers load the snapshot lock-free through `ArcSwap`
//! - Every mutation runs under one mutex (the critical section), and so does
//!   registration of new proxy nodes, so a node can never be created holding
//!   a handle for a replica that was removed meanwhile
//! - Lock order: critical section, then node resource maps, then node children

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::cluster::error::{ClusterError, ClusterResult};
use crate::cluster::proxy::{NodeId, ProxyResource};
use crate::config::ClusterConfig;
use crate::driver::Connector;
use crate::health::HealthChecker;
use crate::load_balancer::LoadBalancer;
use crate::membership::MembershipNotifier;
use crate::observability::metrics;
use crate::replica::{Replica, ReplicaId, ReplicaSet};

/// Who asked for a deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationSource {
    /// A dispatch unit failed and the replica failed its probe.
    Dispatch,
    /// The background health monitor.
    Monitor,
    /// The admin API.
    Admin,
    /// A direct call to [`Cluster::deactivate`].
    Local,
    /// An announcement from another process. Never re-announced.
    Remote,
}

impl DeactivationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeactivationSource::Dispatch => "dispatch",
            DeactivationSource::Monitor => "monitor",
            DeactivationSource::Admin => "admin",
            DeactivationSource::Local => "local",
            DeactivationSource::Remote => "remote",
        }
    }

    fn announces(&self) -> bool {
        !matches!(self, DeactivationSource::Remote)
    }
}

/// A named replicated database: its replicas, balancer and health checker.
pub struct Cluster {
    name: String,
    live: ArcSwap<ReplicaSet>,
    /// Deactivated replicas, in removal order. Its lock is the critical section.
    deactivated: Mutex<Vec<Replica>>,
    roots: Mutex<HashMap<NodeId, Arc<dyn ProxyResource>>>,
    checker: HealthChecker,
    balancer: Box<dyn LoadBalancer>,
    unit_timeout: Option<Duration>,
    notifier: Arc<dyn MembershipNotifier>,
}

impl Cluster {
    pub fn new(
        name: impl Into<String>,
        replicas: ReplicaSet,
        checker: HealthChecker,
        balancer: Box<dyn LoadBalancer>,
        notifier: Arc<dyn MembershipNotifier>,
    ) -> Self {
        let name = name.into();
        metrics::record_live_replicas(&name, replicas.len());
        Self {
            name,
            live: ArcSwap::from_pointee(replicas),
            deactivated: Mutex::new(Vec::new()),
            roots: Mutex::new(HashMap::new()),
            checker,
            balancer,
            unit_timeout: None,
            notifier,
        }
    }

    /// Build a cluster from its configuration block.
    pub fn from_config(
        config: &ClusterConfig,
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn MembershipNotifier>,
    ) -> ClusterResult<Self> {
        if config.replicas.is_empty() {
            return Err(ClusterError::InvalidConfig(format!(
                "cluster '{}' declares no replicas",
                config.name
            )));
        }

        let mut replicas = Vec::with_capacity(config.replicas.len());
        for replica in &config.replicas {
            let parsed = Replica::from_config(replica).map_err(|e| {
                ClusterError::InvalidConfig(format!(
                    "replica '{}' of cluster '{}': {}",
                    replica.id, config.name, e
                ))
            })?;
            replicas.push(parsed);
        }

        let checker = HealthChecker::new(
            config.name.clone(),
            connector,
            config.validation_statement.clone(),
            Duration::from_millis(config.probe_timeout_ms),
        );

        let mut cluster = Self::new(
            config.name.clone(),
            ReplicaSet::new(replicas),
            checker,
            config.balancer.build(),
            notifier,
        );
        cluster.unit_timeout = config.unit_timeout_ms.map(Duration::from_millis);

        tracing::info!(
            cluster = %cluster.name,
            replicas = cluster.live.load().len(),
            balancer = ?config.balancer,
            "Cluster initialized"
        );
        Ok(cluster)
    }

    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the live replicas.
    pub fn live_replicas(&self) -> Arc<ReplicaSet> {
        self.live.load_full()
    }

    pub fn deactivated_replicas(&self) -> Vec<Replica> {
        self.deactivated.lock().clone()
    }

    pub fn is_live(&self, replica: &Replica) -> bool {
        self.live.load().contains(replica)
    }

    /// Look a replica up by id among live and deactivated replicas.
    pub fn replica(&self, id: &ReplicaId) -> Option<Replica> {
        if let Some(replica) = self.live.load().find(id) {
            return Some(replica.clone());
        }
        self.deactivated.lock().iter().find(|r| r.id() == id).cloned()
    }

    pub fn health_checker(&self) -> &HealthChecker {
        &self.checker
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        self.checker.connector()
    }

    pub(crate) fn balancer(&self) -> &dyn LoadBalancer {
        self.balancer.as_ref()
    }

    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout
    }

    /// Number of open root resources.
    pub fn open_resources(&self) -> usize {
        self.roots.lock().len()
    }

    /// Remove `replica` from the live set. Returns false if it was not live.
    pub fn deactivate(&self, replica: &Replica) -> bool {
        self.deactivate_with(replica, DeactivationSource::Local)
    }

    pub(crate) fn deactivate_with(&self, replica: &Replica, source: DeactivationSource) -> bool {
        let remaining = {
            let mut deactivated = self.deactivated.lock();

            let current = self.live.load_full();
            if !current.contains(replica) {
                tracing::trace!(cluster = %self.name, replica = %replica, "Replica already inactive");
                return false;
            }

            let remaining = current.without(replica);
            let count = remaining.len();
            self.live.store(Arc::new(remaining));
            deactivated.push(replica.clone());

            let roots: Vec<Arc<dyn ProxyResource>> = self.roots.lock().values().cloned().collect();
            for root in roots {
                root.drop_replica(replica);
            }
            count
        };

        tracing::warn!(
            cluster = %self.name,
            replica = %replica,
            source = source.as_str(),
            remaining,
            "Replica deactivated"
        );
        if remaining == 0 {
            tracing::error!(cluster = %self.name, "Cluster has no live replicas left");
        }
        metrics::record_deactivation(&self.name, replica.id().as_str(), source.as_str());
        metrics::record_live_replicas(&self.name, remaining);

        if source.announces() {
            self.notifier.announce(&self.name, replica);
        }
        true
    }

    /// Apply a deactivation announced by another process.
    pub(crate) fn deactivate_remote(&self, id: &ReplicaId) -> bool {
        let replica = match self.live.load().find(id) {
            Some(replica) => replica.clone(),
            None => return false,
        };
        self.deactivate_with(&replica, DeactivationSource::Remote)
    }

    /// Run `f` against the live set with membership frozen.
    pub(crate) fn critical_section<R>(&self, f: impl FnOnce(&ReplicaSet) -> R) -> R {
        let _membership = self.deactivated.lock();
        let live = self.live.load();
        f(&live)
    }

    /// Must be called from inside [`Cluster::critical_section`].
    pub(crate) fn register_root(&self, node: Arc<dyn ProxyResource>) {
        self.roots.lock().insert(node.node_id(), node);
    }

    pub(crate) fn detach_root(&self, id: NodeId) {
        self.roots.lock().remove(&id);
    }
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .field("live", &self.live.load().ids())
            .field("balancer", &self.balancer)
            .field("unit_timeout", &self.unit_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{NativeError, Session};
    use crate::membership::LocalMembership;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(&self, _replica: &Replica) -> Result<Box<dyn Session>, NativeError> {
            Err("unreachable".into())
        }
    }

    #[derive(Debug, Default)]
    struct CountingNotifier(AtomicUsize);

    impl MembershipNotifier for CountingNotifier {
        fn announce(&self, _cluster: &str, _replica: &Replica) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn cluster(notifier: Arc<dyn MembershipNotifier>) -> Cluster {
        let config = ClusterConfig::new(
            "orders",
            vec![
                crate::config::ReplicaConfig::new("a", "mock://a"),
                crate::config::ReplicaConfig::new("b", "mock://b"),
                crate::config::ReplicaConfig::new("c", "mock://c"),
            ],
        );
        Cluster::from_config(&config, Arc::new(Unreachable), notifier).unwrap()
    }

    #[test]
    fn deactivation_is_idempotent() {
        let notifier = Arc::new(CountingNotifier::default());
        let cluster = cluster(notifier.clone());
        let b = cluster.replica(&ReplicaId::from("b")).unwrap();

        assert!(cluster.deactivate(&b));
        assert!(!cluster.deactivate(&b));

        let live: Vec<_> = cluster.live_replicas().ids();
        assert_eq!(live, vec![ReplicaId::from("a"), ReplicaId::from("c")]);
        assert_eq!(cluster.deactivated_replicas(), vec![b.clone()]);
        assert!(!cluster.is_live(&b));
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remote_deactivation_is_not_announced() {
        let notifier = Arc::new(CountingNotifier::default());
        let cluster = cluster(notifier.clone());

        assert!(cluster.deactivate_remote(&ReplicaId::from("a")));
        assert!(!cluster.deactivate_remote(&ReplicaId::from("a")));
        assert!(!cluster.deactivate_remote(&ReplicaId::from("zz")));
        assert_eq!(cluster.live_replicas().len(), 2);
        assert_eq!(notifier.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn deactivated_replicas_stay_resolvable() {
        let cluster = cluster(Arc::new(LocalMembership));
        let a = cluster.replica(&ReplicaId::from("a")).unwrap();
        cluster.deactivate(&a);
        assert_eq!(cluster.replica(&ReplicaId::from("a")), Some(a));
        assert!(cluster.replica(&ReplicaId::from("zz")).is_none());
    }

    #[test]
    fn rejects_bad_location() {
        let config = ClusterConfig::new(
            "orders",
            vec![crate::config::ReplicaConfig::new("a", "not a url")],
        );
        let err = Cluster::from_config(&config, Arc::new(Unreachable), Arc::new(LocalMembership))
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvalidConfig(_)));
    }

    #[test]
    fn panic_inside_critical_section_leaves_cluster_usable() {
        let cluster = cluster(Arc::new(LocalMembership));
        let b = cluster.replica(&ReplicaId::from("b")).unwrap();

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cluster.critical_section(|_| panic!("bug while holding membership"))
        }));
        assert!(panicked.is_err());

        assert!(cluster.deactivate(&b));
        assert_eq!(cluster.deactivated_replicas(), vec![b]);
        assert_eq!(cluster.open_resources(), 0);
    }
}
