//! Deactivation propagation between cluster managers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use replica_proxy::cluster::ClusterManager;
use replica_proxy::membership::{
    Membership, MembershipEvent, MemoryBus, PayloadHandler, Transport, TransportError, MEMBERSHIP_TOPIC,
};
use replica_proxy::replica::ReplicaId;

mod common;
use common::*;

/// Memory bus that counts published announcements.
#[derive(Clone, Default)]
struct CountingBus {
    bus: MemoryBus,
    published: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for CountingBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.published.fetch_add(1, Ordering::SeqCst);
        self.bus.publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: PayloadHandler) -> Result<(), TransportError> {
        self.bus.subscribe(topic, handler).await
    }
}

/// Transport whose deliveries always fail.
struct BrokenTransport;

#[async_trait]
impl Transport for BrokenTransport {
    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    async fn subscribe(&self, _topic: &str, _handler: PayloadHandler) -> Result<(), TransportError> {
        Ok(())
    }
}

async fn distributed_manager(transport: Arc<dyn Transport>) -> Arc<ClusterManager> {
    ClusterManager::start(Membership::distributed(transport)).await.unwrap()
}

#[tokio::test]
async fn managers_converge_on_the_union_of_deactivations() {
    let transport = CountingBus::default();
    let backend = MockBackend::new(&["a", "b", "c"]);
    let config = cluster_config("orders", &["a", "b", "c"]);

    let first = distributed_manager(Arc::new(transport.clone())).await;
    let second = distributed_manager(Arc::new(transport.clone())).await;
    let left = first.add_cluster(&config, backend.connector()).unwrap();
    let right = second.add_cluster(&config, backend.connector()).unwrap();

    assert!(left.deactivate(&replica(&left, "a")));
    assert!(right.deactivate(&replica(&right, "c")));

    assert!(eventually(|| live_ids(&left) == vec!["b"] && live_ids(&right) == vec!["b"]).await);

    // Remote deactivations are applied without being announced again.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.published.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dispatch_deactivation_reaches_peers() {
    let transport = MemoryBus::new();
    let backend = MockBackend::new(&["a", "b"]);
    let config = cluster_config("orders", &["a", "b"]);

    let first = distributed_manager(Arc::new(transport.clone())).await;
    let second = distributed_manager(Arc::new(transport.clone())).await;
    let left = first.add_cluster(&config, backend.connector()).unwrap();
    let right = second.add_cluster(&config, backend.connector()).unwrap();

    let conn = right.connect().await.unwrap();
    backend.db("a").kill();
    let touched = left.connect().await.unwrap().execute("INSERT INTO t VALUES (1)").await.unwrap();
    assert_eq!(touched, 1);
    assert_eq!(live_ids(&left), vec!["b"]);

    assert!(eventually(|| live_ids(&right) == vec!["b"]).await);
    assert!(conn.handle(&replica(&right, "a")).is_none());
}

#[tokio::test]
async fn own_and_foreign_events_are_told_apart() {
    let transport = MemoryBus::new();
    let backend = MockBackend::new(&["a", "b"]);
    let manager = distributed_manager(Arc::new(transport.clone())).await;
    let cluster = manager
        .add_cluster(&cluster_config("orders", &["a", "b"]), backend.connector())
        .unwrap();

    let own = MembershipEvent::new(manager.origin(), "orders", ReplicaId::from("a"));
    transport
        .publish(MEMBERSHIP_TOPIC, serde_json::to_vec(&own).unwrap())
        .await
        .unwrap();
    let unknown = MembershipEvent::new(Uuid::new_v4(), "billing", ReplicaId::from("a"));
    transport
        .publish(MEMBERSHIP_TOPIC, serde_json::to_vec(&unknown).unwrap())
        .await
        .unwrap();
    transport.publish(MEMBERSHIP_TOPIC, b"not json".to_vec()).await.unwrap();
    let foreign = MembershipEvent::new(Uuid::new_v4(), "orders", ReplicaId::from("b"));
    transport
        .publish(MEMBERSHIP_TOPIC, serde_json::to_vec(&foreign).unwrap())
        .await
        .unwrap();

    assert!(eventually(|| live_ids(&cluster) == vec!["a"]).await);
}

#[tokio::test]
async fn failed_publication_leaves_local_state_intact() {
    let backend = MockBackend::new(&["a", "b"]);
    let manager = distributed_manager(Arc::new(BrokenTransport)).await;
    let cluster = manager
        .add_cluster(&cluster_config("orders", &["a", "b"]), backend.connector())
        .unwrap();

    assert!(cluster.deactivate(&replica(&cluster, "a")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(live_ids(&cluster), vec!["b"]);
}

#[tokio::test]
async fn announcements_before_loading_are_not_lost() {
    let transport = MemoryBus::new();
    let backend = MockBackend::new(&["a", "b", "c"]);
    let config = cluster_config("orders", &["a", "b", "c"]);

    let first = distributed_manager(Arc::new(transport.clone())).await;
    let second = distributed_manager(Arc::new(transport.clone())).await;
    let left = first.add_cluster(&config, backend.connector()).unwrap();

    assert!(left.deactivate(&replica(&left, "c")));
    // Give the announcement time to reach the second manager before it loads.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let right = second.add_cluster(&config, backend.connector()).unwrap();
    assert_eq!(live_ids(&right), vec!["a", "b"]);
    assert_eq!(right.deactivated_replicas(), vec![replica(&right, "c")]);
}
