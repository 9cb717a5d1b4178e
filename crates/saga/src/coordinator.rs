//! Saga coordinator for the order → payment saga.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::CorrelationId;
use tracing::Instrument;

use crate::bus::{BusError, MessageBus, MessageHandler};
use crate::config::{LateRollbackPolicy, SagaConfig};
use crate::envelope::{Action, Envelope};
use crate::error::{HandlingError, LedgerError, SagaError};
use crate::ledger::{Order, OrderLedger};
use crate::state::OrderStatus;

/// Drives the two-step order/payment saga.
///
/// Creation requests register a Pending order and publish a Start message
/// to the payment channel. Payment outcomes arrive on the order channel
/// and are applied to the ledger idempotently, since the bus may deliver
/// them late, out of order, or more than once.
pub struct SagaCoordinator<B: MessageBus> {
    ledger: OrderLedger,
    bus: Arc<B>,
    config: Arc<SagaConfig>,
}

impl<B: MessageBus + 'static> SagaCoordinator<B> {
    /// Creates a coordinator with the default configuration.
    pub fn new(bus: B) -> Self {
        Self::with_config(bus, SagaConfig::default())
    }

    /// Creates a coordinator with the given configuration.
    pub fn with_config(bus: B, config: SagaConfig) -> Self {
        Self {
            ledger: OrderLedger::new(),
            bus: Arc::new(bus),
            config: Arc::new(config),
        }
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    /// Subscribes the coordinator to the order channel.
    pub async fn subscribe(self: &Arc<Self>) -> Result<(), BusError> {
        let handler: Arc<dyn MessageHandler> = self.clone();
        self.bus.subscribe(&self.config.order_channel, handler).await
    }

    /// Starts a saga for a new order.
    ///
    /// Returns the correlation ID of the saga attempt. If the Start
    /// message cannot be published after all retries, the order is
    /// removed again and the publish error is returned.
    ///
    /// Once the order is registered, publishing and compensation run on
    /// their own task: dropping the returned future does not stop them,
    /// so the order is either started or removed either way.
    #[tracing::instrument(skip(self))]
    pub async fn initiate(&self, key: &str, amount: u64) -> Result<CorrelationId, SagaError> {
        if key.trim().is_empty() {
            return Err(SagaError::InvalidOrder(
                "order key must not be empty".to_string(),
            ));
        }

        let order = self.ledger.create(key, amount).await.inspect_err(|e| {
            tracing::info!(%key, error = %e, "order rejected");
        })?;
        let correlation_id = order.correlation_id.clone();

        let envelope = Envelope::start(correlation_id.clone(), key, amount);
        let task = tokio::spawn(
            start_saga(
                self.bus.clone(),
                self.config.clone(),
                self.ledger.clone(),
                envelope,
            )
            .instrument(tracing::Span::current()),
        );

        match task.await {
            Ok(result) => result.map(|()| correlation_id),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(SagaError::Publish {
                channel: self.config.payment_channel.clone(),
                attempts: 0,
                source: BusError::Closed,
            }),
        }
    }

    /// Applies one inbound envelope to the ledger.
    ///
    /// Stale, duplicate, misrouted and unknown messages are logged and
    /// ignored. The only error is a rejected late rollback.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            correlation_id = %envelope.correlation_id,
            key = %envelope.key(),
            action = %envelope.action,
        )
    )]
    pub async fn on_message(&self, envelope: Envelope) -> Result<(), HandlingError> {
        match envelope.action {
            Action::Start => {
                metrics::counter!("saga_messages_ignored_total", "reason" => "start")
                    .increment(1);
                tracing::warn!("ignoring inbound Start message");
                Ok(())
            }
            Action::Done => {
                self.confirm_payment(&envelope).await;
                Ok(())
            }
            Action::Error => self.compensate(&envelope).await,
            Action::Unknown => {
                metrics::counter!("saga_messages_ignored_total", "reason" => "unknown_action")
                    .increment(1);
                tracing::warn!("ignoring message with unknown action");
                Ok(())
            }
        }
    }

    async fn confirm_payment(&self, envelope: &Envelope) {
        let key = envelope.key();
        self.warn_on_foreign_attempt(envelope).await;

        match self.ledger.mark_paid(key).await {
            Ok(OrderStatus::Pending) => {
                metrics::counter!("saga_paid_total").increment(1);
                tracing::info!("order paid");
            }
            Ok(_) => {
                metrics::counter!("saga_messages_ignored_total", "reason" => "duplicate")
                    .increment(1);
                tracing::debug!("duplicate payment confirmation");
            }
            Err(e) => {
                metrics::counter!("saga_messages_ignored_total", "reason" => "not_found")
                    .increment(1);
                tracing::warn!(error = %e, "payment confirmation for unknown order");
            }
        }
    }

    async fn compensate(&self, envelope: &Envelope) -> Result<(), HandlingError> {
        let key = envelope.key();
        self.warn_on_foreign_attempt(envelope).await;

        let removed = match self.config.late_rollback {
            LateRollbackPolicy::Accept => self.ledger.rollback(key).await,
            LateRollbackPolicy::Reject => match self.ledger.rollback_pending(key).await {
                Ok(removed) => removed,
                Err(LedgerError::AlreadyPaid(_)) => {
                    metrics::counter!("saga_messages_ignored_total", "reason" => "late_rollback")
                        .increment(1);
                    tracing::warn!("rollback rejected, order already paid");
                    return Err(HandlingError::LateRollbackRejected(key.to_string()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "rollback failed");
                    None
                }
            },
        };

        match removed {
            Some(order) => {
                metrics::counter!("saga_rolled_back_total").increment(1);
                tracing::info!(amount = order.amount, "order rolled back");
            }
            None => tracing::debug!("rollback for absent order"),
        }
        Ok(())
    }

    async fn warn_on_foreign_attempt(&self, envelope: &Envelope) {
        if let Some(order) = self.ledger.get(envelope.key()).await
            && order.correlation_id != envelope.correlation_id
        {
            tracing::warn!(
                expected = %order.correlation_id,
                "message correlation id does not match the current attempt"
            );
        }
    }

    /// Returns the status of every known order.
    pub async fn snapshot(&self) -> BTreeMap<String, OrderStatus> {
        self.ledger.snapshot().await
    }

    /// Returns the order for `key`, if any.
    pub async fn order(&self, key: &str) -> Option<Order> {
        self.ledger.get(key).await
    }
}

/// Publishes the Start message for a registered order, removing the order
/// again if every attempt fails.
async fn start_saga<B: MessageBus>(
    bus: Arc<B>,
    config: Arc<SagaConfig>,
    ledger: OrderLedger,
    envelope: Envelope,
) -> Result<(), SagaError> {
    let key = envelope.key();
    let correlation_id = &envelope.correlation_id;

    if let Err(e) = publish_with_retry(bus.as_ref(), &config, &envelope).await {
        let removed = ledger.discard(key, correlation_id).await;
        metrics::counter!("saga_publish_failures_total").increment(1);
        tracing::error!(
            %key,
            %correlation_id,
            error = %e,
            compensated = removed,
            "start message not published, order rolled back"
        );
        return Err(e);
    }

    metrics::counter!("saga_initiated_total").increment(1);
    tracing::info!(%key, %correlation_id, amount = envelope.amount(), "saga started");
    Ok(())
}

async fn publish_with_retry<B: MessageBus>(
    bus: &B,
    config: &SagaConfig,
    envelope: &Envelope,
) -> Result<(), SagaError> {
    let channel = &config.payment_channel;
    let max_attempts = config.publish_max_attempts.max(1);
    let started = std::time::Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = tokio::time::timeout(config.publish_timeout, bus.publish(channel, envelope))
            .await
            .unwrap_or(Err(BusError::Timeout));

        match result {
            Ok(()) => {
                metrics::histogram!("saga_publish_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                return Ok(());
            }
            Err(e) if attempt < max_attempts => {
                let delay = config.backoff_after(attempt);
                tracing::warn!(%channel, attempt, error = %e, ?delay, "publish failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(source) => {
                return Err(SagaError::Publish {
                    channel: channel.clone(),
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

#[async_trait]
impl<B: MessageBus + 'static> MessageHandler for SagaCoordinator<B> {
    async fn handle(&self, body: &[u8]) -> Result<(), HandlingError> {
        let envelope = Envelope::decode(body).inspect_err(|e| {
            metrics::counter!("saga_decode_errors_total").increment(1);
            tracing::warn!(error = %e, "dropping malformed message");
        })?;
        self.on_message(envelope).await
    }
}
