//! HTTP front end for the order/payment saga coordinator.
//!
//! Exposes order creation and ledger queries over REST, with structured
//! logging (tracing) and Prometheus metrics. The message bus is the
//! in-process implementation; payments can be simulated in-process too.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{BusError, InMemoryMessageBus, MessageBus, PaymentSimulator, SagaCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: MessageBus + 'static>(
    state: Arc<AppState<B>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health::<B>))
        .route(
            "/orders",
            post(routes::orders::create::<B>).get(routes::orders::list::<B>),
        )
        .route("/orders/{key}", get(routes::orders::get::<B>))
        .route(
            "/create/{name}/{amount}",
            post(routes::orders::create_from_path::<B>)
                .get(routes::orders::create_from_path::<B>),
        )
        .route("/get-order", get(routes::orders::list::<B>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the coordinator (and, if enabled, the payment simulator) onto a
/// fresh in-memory bus.
pub async fn create_default_state(
    config: &Config,
) -> Result<(Arc<AppState<InMemoryMessageBus>>, InMemoryMessageBus), BusError> {
    let bus = InMemoryMessageBus::new();

    let coordinator = Arc::new(SagaCoordinator::with_config(
        bus.clone(),
        config.saga.clone(),
    ));
    coordinator.subscribe().await?;

    if config.simulate_payments {
        let payment = Arc::new(PaymentSimulator::with_reply_channel(
            bus.clone(),
            config.saga.order_channel.clone(),
        ));
        payment.subscribe(&config.saga.payment_channel).await?;
        tracing::info!(channel = %config.saga.payment_channel, "payment simulator enabled");
    }

    Ok((Arc::new(AppState { coordinator }), bus))
}
