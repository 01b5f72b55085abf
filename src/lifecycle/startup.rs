//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the membership transport and the cluster manager
//! - Register every configured cluster
//! - Start background tasks (health monitor, admin API)
//! - Wait for a termination signal and shut everything down
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The admin API starts last, once clusters are registered

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AppState};
use crate::cluster::{ClusterError, ClusterManager};
use crate::config::{MembershipMode, ReplicationConfig};
use crate::driver::tcp::TcpConnector;
use crate::driver::Connector;
use crate::health::HealthMonitor;
use crate::lifecycle::{signals, Shutdown};
use crate::membership::{Membership, TcpTransport, TcpTransportConfig, TransportError};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cluster setup failed: {0}")]
    Cluster(#[from] ClusterError),

    #[error("membership transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid admin bind address '{0}'")]
    AdminAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A started supervisor: manager plus its background tasks.
pub struct Supervisor {
    manager: Arc<ClusterManager>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
    admin_address: Option<SocketAddr>,
}

impl Supervisor {
    pub async fn start(config: ReplicationConfig) -> Result<Self, StartupError> {
        let shutdown = Shutdown::new();

        // 1. Membership
        let membership = match config.membership.mode {
            MembershipMode::Local => Membership::Local,
            MembershipMode::Distributed => {
                let transport_config = TcpTransportConfig::from_membership(&config.membership)?;
                let transport = TcpTransport::bind(transport_config, shutdown.subscribe()).await?;
                Membership::Distributed {
                    transport: Arc::new(transport),
                    topic: config.membership.topic.clone(),
                }
            }
        };
        let manager = ClusterManager::start(membership).await?;

        // 2. Clusters
        manager.load(&config.clusters, |cluster| {
            Arc::new(TcpConnector::new(Duration::from_millis(cluster.probe_timeout_ms))) as Arc<dyn Connector>
        })?;

        let mut tasks = Vec::new();

        // 3. Health monitor
        let monitor = HealthMonitor::new(Arc::clone(&manager), config.health_monitor.clone());
        tasks.push(tokio::spawn(monitor.run(shutdown.subscribe())));

        // 4. Admin API
        let mut admin_address = None;
        if config.admin.enabled {
            let addr: SocketAddr = config
                .admin
                .bind_address
                .parse()
                .map_err(|_| StartupError::AdminAddress(config.admin.bind_address.clone()))?;
            let listener = TcpListener::bind(addr).await?;
            let local_addr = listener.local_addr()?;
            let router = setup_admin_router(AppState::new(Arc::clone(&manager), &config.admin.api_key));
            let mut stop = shutdown.subscribe();

            tasks.push(tokio::spawn(async move {
                let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                });
                if let Err(e) = server.await {
                    tracing::error!(error = %e, "Admin API server failed");
                }
            }));
            tracing::info!(address = %local_addr, "Admin API listening");
            admin_address = Some(local_addr);
        }

        tracing::info!(
            clusters = manager.clusters().len(),
            origin = %manager.origin(),
            "Supervisor started"
        );

        Ok(Self {
            manager,
            shutdown,
            tasks,
            admin_address,
        })
    }

    pub fn manager(&self) -> &Arc<ClusterManager> {
        &self.manager
    }

    pub fn admin_address(&self) -> Option<SocketAddr> {
        self.admin_address
    }

    /// Signal every background task and wait for them to stop.
    pub async fn stop(self) {
        tracing::info!(tasks = self.tasks.len(), "Shutting down");
        self.shutdown.trigger();
        self.shutdown.drain(self.tasks, SHUTDOWN_DEADLINE).await;
        tracing::info!("Shutdown complete");
    }
}

/// Start the supervisor and run until SIGINT or SIGTERM.
pub async fn run(config: ReplicationConfig) -> Result<(), StartupError> {
    let supervisor = Supervisor::start(config).await?;
    signals::wait_for_termination().await;
    supervisor.stop().await;
    Ok(())
}
