//! In-memory payment service that answers Start messages.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::CorrelationId;
use tokio::sync::RwLock;

use crate::bus::{BusError, MessageBus, MessageHandler};
use crate::config::ORDER_CHANNEL;
use crate::envelope::{Action, Envelope};
use crate::error::HandlingError;

/// A payment recorded by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    /// The payment ID assigned by the simulator.
    pub payment_id: String,
    pub key: String,
    pub amount: u64,
}

#[derive(Debug, Default)]
struct PaymentSimulatorState {
    payments: HashMap<CorrelationId, PaymentRecord>,
    next_id: u32,
    fail_on_charge: bool,
}

/// Stand-in for the external payment service.
///
/// Consumes Start messages from the payment channel, charges the order and
/// replies with Done (or Error when declining) on the reply channel. A
/// redelivered Start for an already charged attempt is answered again
/// without charging twice.
pub struct PaymentSimulator<B: MessageBus> {
    bus: B,
    reply_channel: String,
    state: Arc<RwLock<PaymentSimulatorState>>,
}

impl<B: MessageBus + 'static> PaymentSimulator<B> {
    /// Creates a simulator replying on the default order channel.
    pub fn new(bus: B) -> Self {
        Self::with_reply_channel(bus, ORDER_CHANNEL)
    }

    /// Creates a simulator replying on `reply_channel`.
    pub fn with_reply_channel(bus: B, reply_channel: impl Into<String>) -> Self {
        Self {
            bus,
            reply_channel: reply_channel.into(),
            state: Arc::new(RwLock::new(PaymentSimulatorState::default())),
        }
    }

    /// Subscribes the simulator to `channel`.
    pub async fn subscribe(self: &Arc<Self>, channel: &str) -> Result<(), BusError> {
        let handler: Arc<dyn MessageHandler> = self.clone();
        self.bus.subscribe(channel, handler).await
    }

    /// Configures the simulator to decline every charge.
    pub async fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().await.fail_on_charge = fail;
    }

    /// Returns the number of successful charges.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    /// Returns the payment made for a saga attempt, if any.
    pub async fn payment(&self, correlation_id: &CorrelationId) -> Option<PaymentRecord> {
        self.state.read().await.payments.get(correlation_id).cloned()
    }

    async fn charge(&self, envelope: &Envelope) -> Envelope {
        let mut state = self.state.write().await;
        let correlation_id = envelope.correlation_id.clone();

        if !state.payments.contains_key(&correlation_id) {
            if state.fail_on_charge {
                tracing::info!(%correlation_id, key = %envelope.key(), "payment declined");
                return Envelope::error(correlation_id, envelope.key(), envelope.amount());
            }

            state.next_id += 1;
            let record = PaymentRecord {
                payment_id: format!("PAY-{:04}", state.next_id),
                key: envelope.key().to_string(),
                amount: envelope.amount(),
            };
            tracing::info!(%correlation_id, payment_id = %record.payment_id, "payment charged");
            state.payments.insert(correlation_id.clone(), record);
        }

        Envelope::done(correlation_id, envelope.key(), envelope.amount())
    }
}

#[async_trait]
impl<B: MessageBus + 'static> MessageHandler for PaymentSimulator<B> {
    async fn handle(&self, body: &[u8]) -> Result<(), HandlingError> {
        let envelope = Envelope::decode(body)?;
        if envelope.action != Action::Start {
            tracing::debug!(action = %envelope.action, "payment service ignoring message");
            return Ok(());
        }

        let reply = self.charge(&envelope).await;
        if let Err(e) = self.bus.publish(&self.reply_channel, &reply).await {
            tracing::error!(
                correlation_id = %reply.correlation_id,
                error = %e,
                "failed to publish payment outcome"
            );
        }
        Ok(())
    }
}
