//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ReplicationConfig (validated, immutable)
//!     → ClusterManager builds one Cluster per [[clusters]] entry
//! ```
//!
//! # Design Decisions
//! - Config is consumed once at cluster construction; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ClusterConfig, HealthMonitorConfig, MembershipConfig, MembershipMode,
    ObservabilityConfig, ReplicaConfig, ReplicationConfig,
};
