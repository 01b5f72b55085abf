//! Admin API routes and authentication.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use replica_proxy::admin::{setup_admin_router, AppState};

mod common;
use common::*;

const KEY: &str = "test-secret";

fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn requests_without_valid_token_are_rejected() {
    let (manager, _cluster, _backend) = local_cluster(&["a"]);
    let router = setup_admin_router(AppState::new(manager, KEY));

    let missing = router.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = router.oneshot(request("GET", "/admin/status", Some("nope"))).await.unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lists_clusters_and_replicas() {
    let (manager, cluster, _backend) = local_cluster(&["a", "b"]);
    cluster.deactivate(&replica(&cluster, "b"));
    let router = setup_admin_router(AppState::new(manager, KEY));

    let status = router.clone().oneshot(request("GET", "/admin/status", Some(KEY))).await.unwrap();
    assert_eq!(status.status(), StatusCode::OK);
    assert_eq!(json(status).await["clusters"], 1);

    let response = router.clone().oneshot(request("GET", "/admin/clusters", Some(KEY))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body[0]["name"], "orders");
    assert_eq!(body[0]["live"][0]["id"], "a");
    assert_eq!(body[0]["deactivated"][0]["id"], "b");

    let missing = router.oneshot(request("GET", "/admin/clusters/billing", Some(KEY))).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn probe_and_deactivate_replica() {
    let (manager, cluster, backend) = local_cluster(&["a", "b"]);
    backend.db("b").kill();
    let router = setup_admin_router(AppState::new(manager, KEY));

    let probe = router
        .clone()
        .oneshot(request("POST", "/admin/clusters/orders/replicas/b/probe", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(probe.status(), StatusCode::OK);
    assert_eq!(json(probe).await["alive"], false);
    assert_eq!(live_ids(&cluster), vec!["a", "b"]);

    let first = router
        .clone()
        .oneshot(request("POST", "/admin/clusters/orders/replicas/b/deactivate", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(json(first).await["deactivated"], true);
    assert_eq!(live_ids(&cluster), vec!["a"]);

    let second = router
        .clone()
        .oneshot(request("POST", "/admin/clusters/orders/replicas/b/deactivate", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(json(second).await["deactivated"], false);

    let unknown = router
        .oneshot(request("POST", "/admin/clusters/orders/replicas/zz/deactivate", Some(KEY)))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
