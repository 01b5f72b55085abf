use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AppState;
use crate::cluster::{Cluster, DeactivationSource};
use crate::replica::{Replica, ReplicaId};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub origin: String,
    pub clusters: usize,
}

#[derive(Serialize)]
pub struct ReplicaStatus {
    pub id: String,
    pub location: String,
    pub weight: u32,
}

impl From<&Replica> for ReplicaStatus {
    fn from(replica: &Replica) -> Self {
        Self {
            id: replica.id().to_string(),
            location: replica.location().to_string(),
            weight: replica.weight(),
        }
    }
}

#[derive(Serialize)]
pub struct ClusterStatus {
    pub name: String,
    pub live: Vec<ReplicaStatus>,
    pub deactivated: Vec<ReplicaStatus>,
    pub open_resources: usize,
}

impl From<&Cluster> for ClusterStatus {
    fn from(cluster: &Cluster) -> Self {
        Self {
            name: cluster.name().to_string(),
            live: cluster.live_replicas().iter().map(ReplicaStatus::from).collect(),
            deactivated: cluster.deactivated_replicas().iter().map(ReplicaStatus::from).collect(),
            open_resources: cluster.open_resources(),
        }
    }
}

#[derive(Serialize)]
pub struct ProbeResult {
    pub cluster: String,
    pub replica: String,
    pub alive: bool,
}

#[derive(Serialize)]
pub struct DeactivationResult {
    pub cluster: String,
    pub replica: String,
    /// False when the replica was already inactive.
    pub deactivated: bool,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        origin: state.manager.origin().to_string(),
        clusters: state.manager.clusters().len(),
    })
}

pub async fn get_clusters(State(state): State<AppState>) -> Json<Vec<ClusterStatus>> {
    let statuses = state
        .manager
        .clusters()
        .iter()
        .map(|c| ClusterStatus::from(c.as_ref()))
        .collect();
    Json(statuses)
}

pub async fn get_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClusterStatus>, StatusCode> {
    let cluster = state.manager.get_cluster(&name).map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(Json(ClusterStatus::from(cluster.as_ref())))
}

pub async fn probe_replica(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<ProbeResult>, StatusCode> {
    let cluster = state.manager.get_cluster(&name).map_err(|_| StatusCode::NOT_FOUND)?;
    let replica = cluster.replica(&ReplicaId::new(id)).ok_or(StatusCode::NOT_FOUND)?;

    let alive = cluster.health_checker().probe(&replica).await;
    Ok(Json(ProbeResult {
        cluster: name,
        replica: replica.id().to_string(),
        alive,
    }))
}

pub async fn deactivate_replica(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<DeactivationResult>, StatusCode> {
    let cluster = state.manager.get_cluster(&name).map_err(|_| StatusCode::NOT_FOUND)?;
    let replica = cluster.replica(&ReplicaId::new(id)).ok_or(StatusCode::NOT_FOUND)?;

    let deactivated = cluster.deactivate_with(&replica, DeactivationSource::Admin);
    tracing::info!(cluster = %name, replica = %replica, deactivated, "Admin deactivation requested");
    Ok(Json(DeactivationResult {
        cluster: name,
        replica: replica.id().to_string(),
        deactivated,
    }))
}
