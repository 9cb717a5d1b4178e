//! Integration tests for the API server.

use std::sync::OnceLock;

use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::InMemoryMessageBus;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup_with_config(config: Config) -> (axum::Router, InMemoryMessageBus) {
    let (state, bus) = api::create_default_state(&config).await.unwrap();
    (api::create_app(state, get_metrics_handle()), bus)
}

async fn setup() -> (axum::Router, InMemoryMessageBus) {
    setup_with_config(Config::default()).await
}

async fn setup_without_payments() -> (axum::Router, InMemoryMessageBus) {
    setup_with_config(Config {
        simulate_payments: false,
        ..Config::default()
    })
    .await
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup().await;

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["pending_orders"], 0);
}

#[tokio::test]
async fn test_create_order() {
    let (app, _) = setup_without_payments().await;

    let response = app
        .oneshot(post_json(
            "/orders",
            serde_json::json!({"key": "alice", "amount": 100}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["key"], "alice");
    assert_eq!(json["status"], "Pending");
    assert!(json["correlation_id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_publishes_start_message() {
    let (app, bus) = setup_without_payments().await;

    let response = app
        .oneshot(post_json(
            "/orders",
            serde_json::json!({"key": "alice", "amount": 100}),
        ))
        .await
        .unwrap();
    let json = json_body(response).await;

    let published = bus.published(saga::PAYMENT_CHANNEL).await;
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0].correlation_id.as_str(),
        json["correlation_id"].as_str().unwrap()
    );
    assert_eq!(published[0].action, saga::Action::Start);
    assert_eq!(published[0].key(), "alice");
}

#[tokio::test]
async fn test_duplicate_order_conflicts() {
    let (app, _) = setup_without_payments().await;
    let body = serde_json::json!({"key": "alice", "amount": 100});

    let first = app
        .clone()
        .oneshot(post_json("/orders", body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app.oneshot(post_json("/orders", body)).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let json = json_body(second).await;
    assert!(json["error"].as_str().unwrap().contains("alice"));
}

#[tokio::test]
async fn test_create_rejects_negative_amount() {
    let (app, _) = setup().await;

    let response = app
        .oneshot(post_json(
            "/orders",
            serde_json::json!({"key": "alice", "amount": -5}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_rejects_empty_key() {
    let (app, _) = setup().await;

    let response = app
        .oneshot(post_json(
            "/orders",
            serde_json::json!({"key": "", "amount": 5}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_path_creation_route() {
    let (app, _) = setup_without_payments().await;

    let response = app
        .clone()
        .oneshot(get("/create/bob/30"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bad = app.oneshot(get("/create/carol/lots")).await.unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_orders_become_paid_with_simulated_payments() {
    let (app, bus) = setup().await;

    app.clone()
        .oneshot(post_json(
            "/orders",
            serde_json::json!({"key": "alice", "amount": 100}),
        ))
        .await
        .unwrap();
    bus.flush().await;

    let response = app.clone().oneshot(get("/get-order")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json, serde_json::json!({"alice": "Paid"}));

    let response = app.oneshot(get("/orders/alice")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let order = json_body(response).await;
    assert_eq!(order["status"], "Paid");
    assert_eq!(order["amount"], 100);
}

#[tokio::test]
async fn test_list_orders_snapshot() {
    let (app, _) = setup_without_payments().await;

    for key in ["alice", "bob"] {
        app.clone()
            .oneshot(post_json(
                "/orders",
                serde_json::json!({"key": key, "amount": 10}),
            ))
            .await
            .unwrap();
    }

    let response = app.oneshot(get("/orders")).await.unwrap();
    let json = json_body(response).await;
    assert_eq!(
        json,
        serde_json::json!({"alice": "Pending", "bob": "Pending"})
    );
}

#[tokio::test]
async fn test_get_unknown_order() {
    let (app, _) = setup().await;

    let response = app.oneshot(get("/orders/ghost")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_publish_failure_returns_service_unavailable() {
    let mut config = Config {
        simulate_payments: false,
        ..Config::default()
    };
    config.saga = config
        .saga
        .with_publish_retries(2, std::time::Duration::from_millis(1));
    let (app, bus) = setup_with_config(config).await;
    bus.set_fail_on_publish(true).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/orders",
            serde_json::json!({"key": "alice", "amount": 100}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.oneshot(get("/orders")).await.unwrap();
    assert_eq!(json_body(response).await, serde_json::json!({}));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup().await;

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
