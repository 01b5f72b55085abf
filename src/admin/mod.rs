//! Admin HTTP API.
//!
//! # Endpoints
//! ```text
//! GET  /admin/status
//! GET  /admin/clusters
//! GET  /admin/clusters/{name}
//! POST /admin/clusters/{name}/replicas/{id}/probe
//! POST /admin/clusters/{name}/replicas/{id}/deactivate
//! ```
//! Every route requires `Authorization: Bearer <api_key>`. There is no way to
//! reactivate a replica.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::cluster::ClusterManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ClusterManager>,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(manager: Arc<ClusterManager>, api_key: &str) -> Self {
        Self {
            manager,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/clusters", get(get_clusters))
        .route("/admin/clusters/{name}", get(get_cluster))
        .route("/admin/clusters/{name}/replicas/{id}/probe", post(probe_replica))
        .route("/admin/clusters/{name}/replicas/{id}/deactivate", post(deactivate_replica))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
