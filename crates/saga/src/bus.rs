//! Message bus contract and an in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::task::{JoinError, JoinSet};

use crate::envelope::Envelope;
pub use crate::error::BusError;
use crate::error::HandlingError;

/// Receives raw message bodies delivered on a subscribed channel.
///
/// Delivery is at-least-once: the same body may be handed over more than
/// once, concurrently with other deliveries.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one delivered message body.
    async fn handle(&self, body: &[u8]) -> Result<(), HandlingError>;
}

/// Publish/subscribe transport between saga participants.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes an envelope to a channel.
    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<(), BusError>;

    /// Registers a handler for every message published to a channel.
    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BusError>;
}

#[derive(Default)]
struct InMemoryBusState {
    subscribers: HashMap<String, Vec<Arc<dyn MessageHandler>>>,
    published: Vec<(String, Envelope)>,
    deliveries: JoinSet<()>,
    fail_on_publish: bool,
    failures_remaining: u32,
    publish_delay: Option<Duration>,
    closed: bool,
}

/// In-process message bus.
///
/// A publish is acknowledged once the message is recorded; delivery to
/// subscribers happens on a background task, like a real broker. Fault
/// injection hooks allow tests to simulate rejected or slow publishes.
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    state: Arc<RwLock<InMemoryBusState>>,
}

impl InMemoryMessageBus {
    /// Creates a new in-memory message bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail until reset.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().await.fail_on_publish = fail;
    }

    /// Makes the next `count` publishes fail.
    pub async fn fail_next_publishes(&self, count: u32) {
        self.state.write().await.failures_remaining = count;
    }

    /// Delays every publish acknowledgement by `delay`.
    pub async fn set_publish_delay(&self, delay: Option<Duration>) {
        self.state.write().await.publish_delay = delay;
    }

    /// Stops accepting publishes and subscriptions.
    pub async fn close(&self) {
        self.state.write().await.closed = true;
    }

    /// Returns every envelope accepted on `channel`, oldest first.
    pub async fn published(&self, channel: &str) -> Vec<Envelope> {
        self.state
            .read()
            .await
            .published
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }

    /// Returns the total number of accepted publishes.
    pub async fn publish_count(&self) -> usize {
        self.state.read().await.published.len()
    }

    /// Returns the number of handlers subscribed to `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.state
            .read()
            .await
            .subscribers
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Delivers a raw body to the subscribers of `channel` and waits for
    /// them to finish. Used to inject redeliveries and malformed data.
    pub async fn deliver(&self, channel: &str, body: &[u8]) {
        let handlers = self.handlers(channel).await;
        dispatch(channel, &handlers, body).await;
    }

    /// Waits until every background delivery, including deliveries
    /// triggered by handlers publishing in turn, has completed.
    pub async fn flush(&self) {
        loop {
            let mut deliveries = std::mem::take(&mut self.state.write().await.deliveries);
            if deliveries.is_empty() {
                break;
            }
            while let Some(result) = deliveries.join_next().await {
                log_delivery_failure(result);
            }
        }
    }

    async fn handlers(&self, channel: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.state
            .read()
            .await
            .subscribers
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }
}

async fn dispatch(channel: &str, handlers: &[Arc<dyn MessageHandler>], body: &[u8]) {
    let results = join_all(handlers.iter().map(|handler| handler.handle(body))).await;
    for error in results.into_iter().filter_map(Result::err) {
        tracing::warn!(%channel, %error, "message handler failed, message dropped");
    }
}

fn log_delivery_failure(result: Result<(), JoinError>) {
    if let Err(error) = result {
        tracing::error!(%error, "message delivery task failed");
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<(), BusError> {
        let delay = {
            let mut state = self.state.write().await;
            if state.closed {
                return Err(BusError::Closed);
            }
            if state.fail_on_publish {
                return Err(BusError::Rejected("broker unavailable".to_string()));
            }
            if state.failures_remaining > 0 {
                state.failures_remaining -= 1;
                return Err(BusError::Rejected("broker unavailable".to_string()));
            }
            state.publish_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let body = envelope
            .encode()
            .map_err(|e| BusError::Rejected(e.to_string()))?;

        let mut state = self.state.write().await;
        if state.closed {
            return Err(BusError::Closed);
        }
        state
            .published
            .push((channel.to_string(), envelope.clone()));

        let handlers = state.subscribers.get(channel).cloned().unwrap_or_default();
        if !handlers.is_empty() {
            let channel = channel.to_string();
            while let Some(result) = state.deliveries.try_join_next() {
                log_delivery_failure(result);
            }
            state.deliveries.spawn(async move {
                dispatch(&channel, &handlers, &body).await;
            });
        }

        tracing::debug!(%channel, correlation_id = %envelope.correlation_id, "message published");
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BusError> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(BusError::Closed);
        }
        state
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(handler);
        tracing::info!(%channel, "handler subscribed");
        Ok(())
    }
}
