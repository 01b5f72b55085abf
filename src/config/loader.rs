//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ReplicationConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ReplicationConfig, ConfigError> {
    let config: ReplicationConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ReplicationConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::MembershipMode;
    use crate::load_balancer::BalancerKind;

    const SAMPLE: &str = r#"
[membership]
mode = "distributed"
bind_address = "127.0.0.1:7400"
peers = ["127.0.0.1:7401"]

[health_monitor]
enabled = true
interval_secs = 5

[[clusters]]
name = "orders"
balancer = "least_busy"
unit_timeout_ms = 1500

[[clusters.replicas]]
id = "db1"
location = "postgres://10.0.0.1:5432/orders"
weight = 2

[[clusters.replicas]]
id = "db2"
location = "postgres://10.0.0.2:5432/orders"
properties = { user = "app" }
"#;

    #[test]
    fn parses_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.membership.mode, MembershipMode::Distributed);
        assert_eq!(config.membership.peers.len(), 1);
        assert_eq!(config.health_monitor.failure_threshold, 3);

        let cluster = &config.clusters[0];
        assert_eq!(cluster.balancer, BalancerKind::LeastBusy);
        assert_eq!(cluster.validation_statement, "SELECT 1");
        assert_eq!(cluster.unit_timeout_ms, Some(1500));
        assert_eq!(cluster.replicas[0].weight, 2);
        assert_eq!(cluster.replicas[1].weight, 1);
        assert_eq!(cluster.replicas[1].properties.get("user").map(String::as_str), Some("app"));
    }

    #[test]
    fn empty_config_is_valid() {
        let config = parse_config("").unwrap();
        assert!(config.clusters.is_empty());
        assert_eq!(config.membership.mode, MembershipMode::Local);
    }

    #[test]
    fn validation_errors_surface() {
        let err = parse_config("[[clusters]]\nname = \"x\"\nreplicas = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("at least one replica"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/replica-proxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
