//! Metrics collection and exposition.
//!
//! # Metrics
//! - `replica_dispatch_total` (counter): dispatches by cluster, mode, outcome
//! - `replica_dispatch_duration_seconds` (histogram): dispatch latency
//! - `replica_probe_total` (counter): health probes by cluster, replica, verdict
//! - `replica_deactivations_total` (counter): deactivations by cluster, replica, source
//! - `replica_live_count` (gauge): live replicas per cluster
//! - `replica_membership_publish_total` (counter): announcement deliveries by result

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(cluster: &str, mode: &'static str, outcome: &'static str, start: Instant) {
    ::metrics::counter!(
        "replica_dispatch_total",
        "cluster" => cluster.to_string(),
        "mode" => mode,
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!(
        "replica_dispatch_duration_seconds",
        "cluster" => cluster.to_string(),
        "mode" => mode
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_probe(cluster: &str, replica: &str, alive: bool) {
    ::metrics::counter!(
        "replica_probe_total",
        "cluster" => cluster.to_string(),
        "replica" => replica.to_string(),
        "verdict" => if alive { "alive" } else { "dead" }
    )
    .increment(1);
}

pub fn record_deactivation(cluster: &str, replica: &str, source: &'static str) {
    ::metrics::counter!(
        "replica_deactivations_total",
        "cluster" => cluster.to_string(),
        "replica" => replica.to_string(),
        "source" => source
    )
    .increment(1);
}

pub fn record_live_replicas(cluster: &str, count: usize) {
    ::metrics::gauge!("replica_live_count", "cluster" => cluster.to_string()).set(count as f64);
}

pub fn record_membership_publish(delivered: bool) {
    ::metrics::counter!(
        "replica_membership_publish_total",
        "result" => if delivered { "delivered" } else { "failed" }
    )
    .increment(1);
}
