//! Health and Prometheus endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{MessageBus, OrderStatus};
use serde::Serialize;

use super::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pending_orders: usize,
    pub paid_orders: usize,
}

/// GET /health — liveness plus a summary of the ledger.
pub async fn health<B: MessageBus + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<HealthResponse> {
    let snapshot = state.coordinator.snapshot().await;
    let count = |wanted: OrderStatus| snapshot.values().filter(|s| **s == wanted).count();

    Json(HealthResponse {
        status: "ok",
        pending_orders: count(OrderStatus::Pending),
        paid_orders: count(OrderStatus::Paid),
    })
}

/// GET /metrics — saga counters in Prometheus text format.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
