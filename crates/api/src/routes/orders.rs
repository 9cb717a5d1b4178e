//! Order creation and query endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use saga::{MessageBus, Order, OrderStatus, SagaCoordinator};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<B: MessageBus> {
    pub coordinator: Arc<SagaCoordinator<B>>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub key: String,
    pub amount: u64,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub correlation_id: String,
    pub key: String,
    pub status: OrderStatus,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub key: String,
    pub amount: u64,
    pub status: OrderStatus,
    pub correlation_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            key: order.key,
            amount: order.amount,
            status: order.status,
            correlation_id: order.correlation_id.to_string(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /orders — start the saga for a new order.
#[tracing::instrument(skip(state, req), fields(key = %req.key, amount = req.amount))]
pub async fn create<B: MessageBus + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    start_order(&state, req.key, req.amount).await
}

/// GET|POST /create/:name/:amount — path-parameter variant of order creation.
#[tracing::instrument(skip(state))]
pub async fn create_from_path<B: MessageBus + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path((name, amount)): Path<(String, String)>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let amount = amount
        .parse::<u64>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid amount '{amount}': {e}")))?;
    start_order(&state, name, amount).await
}

async fn start_order<B: MessageBus + 'static>(
    state: &AppState<B>,
    key: String,
    amount: u64,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let correlation_id = state.coordinator.initiate(&key, amount).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            correlation_id: correlation_id.to_string(),
            key,
            status: OrderStatus::Pending,
        }),
    ))
}

/// GET /orders — status of every known order, keyed by order key.
#[tracing::instrument(skip(state))]
pub async fn list<B: MessageBus + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<BTreeMap<String, OrderStatus>> {
    Json(state.coordinator.snapshot().await)
}

/// GET /orders/:key — a single order.
#[tracing::instrument(skip(state))]
pub async fn get<B: MessageBus + 'static>(
    State(state): State<Arc<AppState<B>>>,
    Path(key): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .coordinator
        .order(&key)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Order {key} not found")))?;

    Ok(Json(order.into()))
}
