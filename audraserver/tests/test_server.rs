//! Server routing tests, driven through the router with tower::ServiceExt

use audraserver::{LogState, Server};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use std::time::Duration;
use tower::ServiceExt;
use tracing::Level;
use tracing_subscriber::{Registry, filter::LevelFilter, reload};

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn log_state() -> LogState {
    let (_filter, handle) = reload::Layer::<LevelFilter, Registry>::new(LevelFilter::INFO);
    LogState::new(100, Level::INFO, handle)
}

#[tokio::test]
async fn test_json_route_at_root_and_nested() {
    let mut server = Server::new("Test", "localhost", 0);
    server
        .add_route("/", || async { serde_json::json!({"status": "ok"}) })
        .await;
    server
        .add_route("/api/info", || async { serde_json::json!({"version": 1}) })
        .await;

    let router = server.router().await;

    let resp = router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.into_body()).await["status"], "ok");

    let resp = router
        .oneshot(Request::builder().uri("/api/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(resp.into_body()).await["version"], 1);
}

#[tokio::test]
async fn test_log_setup_routes() {
    let mut server = Server::new("Test", "localhost", 0);
    server.add_log_routes(log_state()).await;
    let router = server.router().await;

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/log_setup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp.into_body()).await;
    assert_eq!(json["current_level"], "INFO");
    assert_eq!(json["available_levels"].as_array().unwrap().len(), 5);

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/log_setup")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"level":"LOUD"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = router
        .oneshot(Request::builder().uri("/log-dump").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_json(resp.into_body()).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_start_and_shutdown() {
    let mut server = Server::new("Test", "localhost", 0);
    server
        .add_route("/", || async { serde_json::json!({"status": "ok"}) })
        .await;

    server.start().await.unwrap();
    assert!(server.local_addr().unwrap().port() > 0);

    server.shutdown();
    tokio::time::timeout(Duration::from_secs(5), server.wait())
        .await
        .expect("server did not stop");
}
