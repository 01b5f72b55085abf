//! replica-proxy supervisor.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                   REPLICA PROXY                       │
//!                     │                                                       │
//!   caller            │  ┌───────────┐    ┌────────────┐    ┌─────────────┐  │
//!   ──────────────────┼─▶│ ProxyNode │───▶│  Cluster   │───▶│ unit/replica│──┼──▶ replica A
//!                     │  │   tree    │    │  dispatch  │    │  (JoinSet)  │──┼──▶ replica B
//!                     │  └─────▲─────┘    └─────┬──────┘    └──────┬──────┘──┼──▶ replica C
//!                     │        │ cascade        │ failure          │          │
//!                     │        │          ┌─────▼──────┐    ┌──────▼──────┐  │
//!                     │        └──────────│ deactivate │◀───│ health probe│  │
//!                     │                   └─────┬──────┘    └─────────────┘  │
//!                     │                         │ announce                    │
//!                     │                   ┌─────▼──────┐                      │
//!                     │                   │ membership │◀────────────────────┼──▶ peer processes
//!                     │                   └────────────┘                      │
//!                     └──────────────────────────────────────────────────────┘
//! ```
//!
//! The supervisor binary hosts the clusters of a configuration file with a
//! reachability-only driver: it probes replicas, propagates deactivations to
//! peers and exposes the admin API. Applications embed the library with their
//! own `Connector`.

use std::path::PathBuf;

use clap::Parser;

use replica_proxy::config::{load_config, ReplicationConfig};
use replica_proxy::lifecycle;
use replica_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "replica-proxy")]
#[command(about = "Replicated database cluster supervisor", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ReplicationConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "replica-proxy starting");

    tracing::info!(
        clusters = config.clusters.len(),
        membership = ?config.membership.mode,
        health_monitor = config.health_monitor.enabled,
        admin = config.admin.enabled,
        "Configuration loaded"
    );
    if config.clusters.is_empty() {
        tracing::warn!("No clusters configured");
    }

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    lifecycle::run(config).await?;
    Ok(())
}
