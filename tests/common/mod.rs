//! Shared utilities for integration tests: an in-memory replicated database.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use replica_proxy::cluster::{Cluster, ClusterManager};
use replica_proxy::config::{ClusterConfig, ReplicaConfig};
use replica_proxy::driver::{Connector, NativeError, NativeHandle, Session};
use replica_proxy::replica::{Replica, ReplicaId};

pub const PROBE: &str = "SELECT 1";

/// Error a live database raises for a statement it rejects.
#[derive(Debug, Error)]
#[error("duplicate key value violates unique constraint ({0})")]
pub struct ConstraintViolation(pub String);

/// One in-memory replica.
#[derive(Default)]
pub struct MockDb {
    name: String,
    down: AtomicBool,
    rejected: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    applied: Mutex<Vec<String>>,
    probes: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MockDb {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Take the replica down: connections are refused, sessions fail.
    pub fn kill(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    /// Reject every statement containing `pattern` with a [`ConstraintViolation`].
    pub fn reject(&self, pattern: &str) {
        self.rejected.lock().unwrap().push(pattern.to_string());
    }

    /// Delay every non-probe statement.
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    async fn run(&self, statement: &str) -> Result<(), NativeError> {
        if self.is_down() {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        if statement == PROBE {
            self.probes.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let rejected = self
            .rejected
            .lock()
            .unwrap()
            .iter()
            .any(|p| statement.contains(p.as_str()));
        if rejected {
            return Err(Box::new(ConstraintViolation(statement.to_string())));
        }
        Ok(())
    }
}

pub struct MockSession {
    db: Arc<MockDb>,
}

#[async_trait]
impl NativeHandle for MockSession {
    async fn close(&self) -> Result<(), NativeError> {
        self.db.closed.fetch_add(1, Ordering::SeqCst);
        if self.db.is_down() {
            return Err("broken pipe".into());
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MockSession {
    async fn execute(&self, statement: &str) -> Result<u64, NativeError> {
        self.db.run(statement).await?;
        if statement != PROBE {
            self.db.applied.lock().unwrap().push(statement.to_string());
        }
        Ok(1)
    }

    async fn query(&self, statement: &str) -> Result<Vec<String>, NativeError> {
        self.db.run(statement).await?;
        Ok(vec![self.db.name.clone()])
    }
}

#[derive(Clone)]
pub struct MockConnector {
    dbs: Arc<HashMap<String, Arc<MockDb>>>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, replica: &Replica) -> Result<Box<dyn Session>, NativeError> {
        let db = self
            .dbs
            .get(replica.id().as_str())
            .cloned()
            .ok_or_else(|| format!("unknown replica {}", replica))?;
        if db.is_down() {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        db.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession { db }))
    }
}

/// A set of mock replicas addressed by id.
#[derive(Clone)]
pub struct MockBackend {
    dbs: Arc<HashMap<String, Arc<MockDb>>>,
}

impl MockBackend {
    pub fn new(ids: &[&str]) -> Self {
        let dbs = ids
            .iter()
            .map(|id| (id.to_string(), Arc::new(MockDb::new(id))))
            .collect();
        Self { dbs: Arc::new(dbs) }
    }

    pub fn db(&self, id: &str) -> &Arc<MockDb> {
        &self.dbs[id]
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            dbs: Arc::clone(&self.dbs),
        })
    }
}

pub fn cluster_config(name: &str, ids: &[&str]) -> ClusterConfig {
    let replicas = ids
        .iter()
        .map(|id| ReplicaConfig::new(*id, format!("mock://{}", id)))
        .collect();
    let mut config = ClusterConfig::new(name, replicas);
    config.probe_timeout_ms = 500;
    config
}

/// A local manager with one cluster backed by fresh mock replicas.
pub fn local_cluster(ids: &[&str]) -> (Arc<ClusterManager>, Arc<Cluster>, MockBackend) {
    local_cluster_with(cluster_config("orders", ids))
}

pub fn local_cluster_with(config: ClusterConfig) -> (Arc<ClusterManager>, Arc<Cluster>, MockBackend) {
    let ids: Vec<&str> = config.replicas.iter().map(|r| r.id.as_str()).collect();
    let backend = MockBackend::new(&ids);
    let manager = ClusterManager::local();
    let cluster = manager.add_cluster(&config, backend.connector()).unwrap();
    (manager, cluster, backend)
}

pub fn live_ids(cluster: &Cluster) -> Vec<String> {
    cluster
        .live_replicas()
        .iter()
        .map(|r| r.id().to_string())
        .collect()
}

pub fn replica(cluster: &Cluster, id: &str) -> Replica {
    cluster.replica(&ReplicaId::from(id)).unwrap()
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// A derived handle that counts how often it is closed.
pub struct TrackedHandle {
    pub replica: Replica,
    closes: Arc<AtomicUsize>,
}

impl TrackedHandle {
    pub fn new(replica: Replica, closes: Arc<AtomicUsize>) -> Self {
        Self { replica, closes }
    }
}

#[async_trait]
impl NativeHandle for TrackedHandle {
    async fn close(&self) -> Result<(), NativeError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
