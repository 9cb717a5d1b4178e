//! Saga coordinator configuration.

use std::str::FromStr;
use std::time::Duration;

/// Channel the coordinator subscribes to for payment outcomes.
pub const ORDER_CHANNEL: &str = "OrderChannel";

/// Channel the coordinator publishes Start messages to.
pub const PAYMENT_CHANNEL: &str = "PaymentChannel";

/// What to do with an Error message for an order that is already Paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LateRollbackPolicy {
    /// Treat it as a compensating rollback and remove the order.
    #[default]
    Accept,

    /// Keep the order Paid and reject the message.
    Reject,
}

impl FromStr for LateRollbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(LateRollbackPolicy::Accept),
            "reject" => Ok(LateRollbackPolicy::Reject),
            other => Err(format!("unknown late rollback policy: {other}")),
        }
    }
}

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    pub order_channel: String,
    pub payment_channel: String,
    /// Upper bound on a single publish attempt.
    pub publish_timeout: Duration,
    /// Total publish attempts before the order is compensated.
    pub publish_max_attempts: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub publish_backoff: Duration,
    pub late_rollback: LateRollbackPolicy,
}

impl SagaConfig {
    pub fn with_channels(
        mut self,
        order_channel: impl Into<String>,
        payment_channel: impl Into<String>,
    ) -> Self {
        self.order_channel = order_channel.into();
        self.payment_channel = payment_channel.into();
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_publish_retries(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.publish_max_attempts = max_attempts.max(1);
        self.publish_backoff = backoff;
        self
    }

    pub fn with_late_rollback(mut self, policy: LateRollbackPolicy) -> Self {
        self.late_rollback = policy;
        self
    }

    /// Returns the delay to wait after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.publish_backoff.saturating_mul(factor)
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            order_channel: ORDER_CHANNEL.to_string(),
            payment_channel: PAYMENT_CHANNEL.to_string(),
            publish_timeout: Duration::from_secs(5),
            publish_max_attempts: 3,
            publish_backoff: Duration::from_millis(100),
            late_rollback: LateRollbackPolicy::Accept,
        }
    }
}
