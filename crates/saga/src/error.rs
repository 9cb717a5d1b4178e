//! Saga error types.

use thiserror::Error;

/// Errors reported by the order ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// An order with this key is already live (Pending or Paid).
    #[error("Order already exists: {0}")]
    Conflict(String),

    /// No order exists for this key.
    #[error("Order not found: {0}")]
    NotFound(String),

    /// The order has already been paid and cannot be rolled back.
    #[error("Order already paid: {0}")]
    AlreadyPaid(String),
}

/// Errors reported by a message bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The broker refused the message.
    #[error("Publish rejected: {0}")]
    Rejected(String),

    /// The broker did not acknowledge the message in time.
    #[error("Publish timed out")]
    Timeout,

    /// The bus has been shut down.
    #[error("Message bus is closed")]
    Closed,
}

/// Errors returned to the caller of `SagaCoordinator::initiate`.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The creation request was malformed.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// An order with the same key is still live.
    #[error("Duplicate order: {0}")]
    DuplicateOrder(String),

    /// Publishing the start message failed on every attempt.
    #[error("Failed to publish to '{channel}' after {attempts} attempt(s): {source}")]
    Publish {
        channel: String,
        attempts: u32,
        #[source]
        source: BusError,
    },

    /// Ledger error not covered by a more specific variant.
    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for SagaError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Conflict(key) => SagaError::DuplicateOrder(key),
            other => SagaError::Ledger(other),
        }
    }
}

/// Errors raised while handling a single inbound message.
///
/// These never escape the bus delivery loop; they are logged and the
/// message is dropped.
#[derive(Debug, Error)]
pub enum HandlingError {
    /// The message body is not a valid envelope.
    #[error("Malformed envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// A rollback arrived for an order that is already paid and the
    /// coordinator is configured to refuse late compensation.
    #[error("Late rollback rejected for paid order: {0}")]
    LateRollbackRejected(String),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
