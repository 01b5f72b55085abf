//! Background health monitor sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use replica_proxy::config::HealthMonitorConfig;
use replica_proxy::health::HealthMonitor;

mod common;
use common::*;

fn monitor_config(threshold: u32) -> HealthMonitorConfig {
    HealthMonitorConfig {
        enabled: true,
        interval_secs: 1,
        failure_threshold: threshold,
    }
}

#[tokio::test]
async fn replica_is_deactivated_after_consecutive_failures() {
    let (manager, cluster, backend) = local_cluster(&["a", "b", "c"]);
    let conn = cluster.connect().await.unwrap();
    let monitor = HealthMonitor::new(Arc::clone(&manager), monitor_config(2));

    backend.db("b").kill();
    assert_eq!(monitor.check_all().await, 0);
    assert_eq!(live_ids(&cluster), vec!["a", "b", "c"]);

    assert_eq!(monitor.check_all().await, 1);
    assert_eq!(live_ids(&cluster), vec!["a", "c"]);
    assert!(conn.handle(&replica(&cluster, "b")).is_none());

    assert_eq!(monitor.check_all().await, 0);
    assert_eq!(backend.db("a").probes(), 3);
}

#[tokio::test]
async fn disabled_monitor_exits_immediately() {
    let (manager, _cluster, backend) = local_cluster(&["a"]);
    let config = HealthMonitorConfig {
        enabled: false,
        ..monitor_config(1)
    };
    let (_tx, rx) = broadcast::channel(1);

    tokio::time::timeout(Duration::from_secs(1), HealthMonitor::new(manager, config).run(rx))
        .await
        .unwrap();
    assert_eq!(backend.db("a").probes(), 0);
}

#[tokio::test]
async fn running_monitor_stops_on_shutdown() {
    let (manager, cluster, backend) = local_cluster(&["a", "b"]);
    backend.db("a").kill();
    let (tx, rx) = broadcast::channel(1);

    let task = tokio::spawn(HealthMonitor::new(manager, monitor_config(1)).run(rx));
    assert!(eventually(|| live_ids(&cluster) == vec!["b"]).await);

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}
