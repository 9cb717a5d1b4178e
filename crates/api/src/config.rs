//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::SagaConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `8081`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `ORDER_CHANNEL` / `PAYMENT_CHANNEL` — bus channel names
/// - `PUBLISH_TIMEOUT_MS` — bound on a single publish attempt (default: `5000`)
/// - `PUBLISH_MAX_ATTEMPTS` — publish attempts before rollback (default: `3`)
/// - `PUBLISH_BACKOFF_MS` — first retry delay, doubled per retry (default: `100`)
/// - `LATE_ROLLBACK` — `accept` or `reject` (default: `accept`)
/// - `SIMULATE_PAYMENTS` — run the in-process payment service (default: `true`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub saga: SagaConfig,
    pub simulate_payments: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|v| v.parse::<u64>().ok());

        let order_channel =
            lookup("ORDER_CHANNEL").unwrap_or_else(|| defaults.saga.order_channel.clone());
        let payment_channel =
            lookup("PAYMENT_CHANNEL").unwrap_or_else(|| defaults.saga.payment_channel.clone());
        let publish_timeout = parsed("PUBLISH_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.saga.publish_timeout);
        let max_attempts = parsed("PUBLISH_MAX_ATTEMPTS")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(defaults.saga.publish_max_attempts);
        let backoff = parsed("PUBLISH_BACKOFF_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.saga.publish_backoff);
        let late_rollback = lookup("LATE_ROLLBACK")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.saga.late_rollback);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            saga: SagaConfig::default()
                .with_channels(order_channel, payment_channel)
                .with_publish_timeout(publish_timeout)
                .with_publish_retries(max_attempts, backoff)
                .with_late_rollback(late_rollback),
            simulate_payments: lookup("SIMULATE_PAYMENTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.simulate_payments),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            log_level: "info".to_string(),
            saga: SagaConfig::default(),
            simulate_payments: true,
        }
    }
}
