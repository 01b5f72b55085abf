//! Configuration validation.
//!
//! Serde handles syntax; this checks semantics. Every problem is reported,
//! not just the first one.

use std::collections::HashSet;
use std::fmt;

use url::Url;

use crate::config::schema::{MembershipMode, ReplicationConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ReplicationConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut cluster_names = HashSet::new();

    for (i, cluster) in config.clusters.iter().enumerate() {
        let path = format!("clusters[{}]", i);

        if cluster.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", path), "must not be empty"));
        } else if !cluster_names.insert(cluster.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", path),
                format!("duplicate cluster name '{}'", cluster.name),
            ));
        }

        if cluster.validation_statement.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{}.validation_statement", path),
                "must not be empty",
            ));
        }
        if cluster.probe_timeout_ms == 0 {
            errors.push(ValidationError::new(
                format!("{}.probe_timeout_ms", path),
                "must be greater than 0",
            ));
        }
        if cluster.unit_timeout_ms == Some(0) {
            errors.push(ValidationError::new(
                format!("{}.unit_timeout_ms", path),
                "must be greater than 0 when set",
            ));
        }

        if cluster.replicas.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.replicas", path),
                "a cluster needs at least one replica",
            ));
        }

        let mut replica_ids = HashSet::new();
        for (j, replica) in cluster.replicas.iter().enumerate() {
            let rpath = format!("{}.replicas[{}]", path, j);
            if replica.id.trim().is_empty() {
                errors.push(ValidationError::new(format!("{}.id", rpath), "must not be empty"));
            } else if !replica_ids.insert(replica.id.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.id", rpath),
                    format!("duplicate replica id '{}'", replica.id),
                ));
            }
            if let Err(e) = Url::parse(&replica.location) {
                errors.push(ValidationError::new(
                    format!("{}.location", rpath),
                    format!("invalid URL '{}': {}", replica.location, e),
                ));
            }
            if replica.weight == 0 {
                errors.push(ValidationError::new(
                    format!("{}.weight", rpath),
                    "must be greater than 0",
                ));
            }
        }
    }

    let membership = &config.membership;
    if membership.mode == MembershipMode::Distributed {
        match membership.bind_address.as_deref() {
            None => errors.push(ValidationError::new(
                "membership.bind_address",
                "required in distributed mode",
            )),
            Some(addr) if addr.parse::<std::net::SocketAddr>().is_err() => {
                errors.push(ValidationError::new(
                    "membership.bind_address",
                    format!("invalid socket address '{}'", addr),
                ))
            }
            Some(_) => {}
        }
        for (i, peer) in membership.peers.iter().enumerate() {
            if peer.parse::<std::net::SocketAddr>().is_err() {
                errors.push(ValidationError::new(
                    format!("membership.peers[{}]", i),
                    format!("invalid socket address '{}'", peer),
                ));
            }
        }
        if membership.topic.trim().is_empty() {
            errors.push(ValidationError::new("membership.topic", "must not be empty"));
        }
        if membership.publish_attempts == 0 {
            errors.push(ValidationError::new(
                "membership.publish_attempts",
                "must be greater than 0",
            ));
        }
    }

    if config.health_monitor.enabled {
        if config.health_monitor.interval_secs == 0 {
            errors.push(ValidationError::new(
                "health_monitor.interval_secs",
                "must be greater than 0",
            ));
        }
        if config.health_monitor.failure_threshold == 0 {
            errors.push(ValidationError::new(
                "health_monitor.failure_threshold",
                "must be greater than 0",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
