//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the replication proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::load_balancer::BalancerKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Cluster definitions.
    pub clusters: Vec<ClusterConfig>,

    /// Cross-process membership propagation.
    pub membership: MembershipConfig,

    /// Periodic health sweep settings.
    pub health_monitor: HealthMonitorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// One logical database made of several replicas.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Unique cluster name.
    pub name: String,

    /// Replicas in priority order. The first live one serves Direct calls.
    pub replicas: Vec<ReplicaConfig>,

    /// Trivial statement executed by health probes.
    #[serde(default = "default_validation_statement")]
    pub validation_statement: String,

    /// Read balancing strategy for SelectOne dispatch.
    #[serde(default)]
    pub balancer: BalancerKind,

    /// Upper bound for a single health probe in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Optional upper bound for a single SelectOne/Broadcast unit in milliseconds.
    #[serde(default)]
    pub unit_timeout_ms: Option<u64>,
}

impl ClusterConfig {
    /// Convenience constructor with defaults for everything but the replicas.
    pub fn new(name: impl Into<String>, replicas: Vec<ReplicaConfig>) -> Self {
        Self {
            name: name.into(),
            replicas,
            validation_statement: default_validation_statement(),
            balancer: BalancerKind::default(),
            probe_timeout_ms: default_probe_timeout_ms(),
            unit_timeout_ms: None,
        }
    }
}

fn default_validation_statement() -> String {
    "SELECT 1".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

/// Backing database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplicaConfig {
    /// Replica identifier, unique within the cluster.
    pub id: String,

    /// Connection URL (e.g., "postgres://10.0.0.1:5432/app").
    pub location: String,

    /// Weight for weighted read balancing (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Extra driver-specific connection parameters.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ReplicaConfig {
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
            weight: default_weight(),
            properties: BTreeMap::new(),
        }
    }
}

fn default_weight() -> u32 {
    1
}

/// How deactivations are shared between processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MembershipMode {
    /// Deactivations stay inside this process.
    #[default]
    Local,
    /// Deactivations are published to and received from peers.
    Distributed,
}

/// Membership propagation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MembershipConfig {
    pub mode: MembershipMode,

    /// Address the TCP transport listens on for peer announcements.
    pub bind_address: Option<String>,

    /// Peer addresses announcements are pushed to.
    pub peers: Vec<String>,

    /// Topic announcements are published on.
    pub topic: String,

    /// Peer connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Delivery attempts per peer before giving up.
    pub publish_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub backoff_base_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            mode: MembershipMode::Local,
            bind_address: None,
            peers: Vec::new(),
            topic: crate::membership::MEMBERSHIP_TOPIC.to_string(),
            connect_timeout_ms: 1_000,
            publish_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 2_000,
        }
    }
}

/// Periodic health sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthMonitorConfig {
    /// Enable the background sweep.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,

    /// Consecutive failed sweeps before a replica is deactivated.
    pub failure_threshold: u32,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10,
            failure_threshold: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
