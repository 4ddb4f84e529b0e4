use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pulsemon_common::metric::Metric;
use pulsemon_common::signer;
use pulsemon_server::api;
use pulsemon_server::app::SyncApp;
use pulsemon_storage::mem::MemStorage;
use std::sync::Arc;
use tower::ServiceExt;

fn build_app(key: &str) -> Router {
    let app = Arc::new(SyncApp::new(Arc::new(MemStorage::new())).with_key(key));
    api::build_router(app)
}

async fn send_json(
    router: &Router,
    method: &str,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    run(router, request).await
}

async fn send_empty(router: &Router, method: &str, path: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    run(router, request).await
}

async fn run(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

#[tokio::test]
async fn counter_updates_accumulate_across_requests() {
    let router = build_app("");

    for _ in 0..2 {
        let (status, _) = send_json(
            &router,
            "POST",
            "/update",
            serde_json::json!({"id": "requests", "type": "counter", "delta": 5}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send_empty(&router, "GET", "/value/counter/requests").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "10");
}

#[tokio::test]
async fn update_response_echoes_the_stored_value() {
    let router = build_app("");
    let (_, body) = send_json(
        &router,
        "POST",
        "/update",
        serde_json::json!({"id": "requests", "type": "counter", "delta": 7}),
    )
    .await;
    let stored: Metric = serde_json::from_str(&body).unwrap();
    assert_eq!(stored.delta, Some(7));
}

#[tokio::test]
async fn gauge_path_update_overwrites() {
    let router = build_app("");

    let (status, _) = send_empty(&router, "POST", "/update/gauge/cpu_load/1.5").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_empty(&router, "POST", "/update/gauge/cpu_load/0.25").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_empty(&router, "GET", "/value/gauge/cpu_load").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "0.25");
}

#[tokio::test]
async fn distinct_status_per_failure_class() {
    let router = build_app("");
    send_json(
        &router,
        "POST",
        "/update",
        serde_json::json!({"id": "requests", "type": "counter", "delta": 1}),
    )
    .await;

    // not yet reported
    let (status, _) = send_empty(&router, "GET", "/value/counter/absent").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // misconfigured kind
    let (status, _) = send_empty(&router, "GET", "/value/gauge/requests").await;
    assert_eq!(status, StatusCode::CONFLICT);

    // unknown kind on the legacy path
    let (status, _) = send_empty(&router, "POST", "/update/histogram/x/1").await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    // malformed value
    let (status, _) = send_empty(&router, "POST", "/update/counter/x/oops").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // missing value
    let (status, _) = send_json(
        &router,
        "POST",
        "/update",
        serde_json::json!({"id": "x", "type": "gauge"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_update_acknowledges_with_first_listed_item() {
    let router = build_app("");
    let (status, body) = send_json(
        &router,
        "POST",
        "/updates",
        serde_json::json!([
            {"id": "requests", "type": "counter", "delta": 5},
            {"id": "requests", "type": "counter", "delta": 7},
            {"id": "cpu_load", "type": "gauge", "reading": 0.5}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // list order is id order, so "cpu_load" is the representative item
    let ack: Metric = serde_json::from_str(&body).unwrap();
    assert_eq!(ack.id, "cpu_load");

    let (_, body) = send_empty(&router, "GET", "/value/counter/requests").await;
    assert_eq!(body, "12");
}

#[tokio::test]
async fn list_endpoint_returns_metrics_ordered_by_id() {
    let router = build_app("");
    send_empty(&router, "POST", "/update/gauge/zeta/1").await;
    send_empty(&router, "POST", "/update/counter/alpha/2").await;

    let (status, body) = send_empty(&router, "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<Metric> = serde_json::from_str(&body).unwrap();
    let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "zeta"]);
}

#[tokio::test]
async fn signed_flow_rejects_bad_signatures_and_signs_responses() {
    let router = build_app("secret");

    let (status, _) = send_json(
        &router,
        "POST",
        "/update",
        serde_json::json!({"id": "requests", "type": "counter", "delta": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut metric = Metric::counter("requests", 5);
    signer::sign(&mut metric, "secret").unwrap();
    let (status, body) = send_json(
        &router,
        "POST",
        "/update",
        serde_json::to_value(&metric).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let stored: Metric = serde_json::from_str(&body).unwrap();
    assert!(signer::verify(&stored, "secret").unwrap());
}

#[tokio::test]
async fn ping_reports_store_liveness() {
    let router = build_app("");
    let (status, _) = send_empty(&router, "GET", "/ping").await;
    assert_eq!(status, StatusCode::OK);
}
