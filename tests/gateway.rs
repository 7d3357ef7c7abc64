//! HTTP front end over a live coordinator

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{fleet, node, shutdown};
use keyfleet::common::HttpConfig;
use keyfleet::gateway::{create_router, GatewayState};
use keyfleet::transport::MemoryNetwork;
use tower::ServiceExt;

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_status_before_start() {
    let net = MemoryNetwork::new();
    let a = node(&net);
    let app = create_router(GatewayState::new(a.clone(), &HttpConfig::default()));

    let (status, body) = get(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["identity"], a.key());
    assert_eq!(json["state"], "created");
    assert_eq!(json["armed"], false);
    assert_eq!(json["peers"], 0);
}

#[tokio::test]
async fn test_unarmed_node_refuses() {
    let net = MemoryNetwork::new();
    let app = create_router(GatewayState::new(node(&net), &HttpConfig::default()));

    let (status, _) = get(&app, "/keys/increment?key=alpha").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = get(&app, "/keys/rename?key=alpha").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_owned_counter() {
    let net = MemoryNetwork::new();
    let nodes = fleet(&net, 1).await;
    let app = create_router(GatewayState::new(
        nodes[0].0.clone(),
        &HttpConfig::default(),
    ));

    let (status, body) = get(&app, "/keys/increment?key=alpha").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "CURRENT FOR [alpha]: 1");

    get(&app, "/keys/increment?key=alpha").await;
    let (_, body) = get(&app, "/keys/decrement?key=alpha").await;
    assert_eq!(body, "CURRENT FOR [alpha]: 1");

    let (_, body) = get(&app, "/keys/value?key=beta").await;
    assert_eq!(body, "CURRENT FOR [beta]: 0");

    let long = "k".repeat(200);
    let (status, _) = get(&app, &format!("/keys/value?key={}", long)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = get(&app, "/status").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["armed"], true);
    assert_eq!(json["owned_keys"], 2);

    shutdown(nodes).await;
}
