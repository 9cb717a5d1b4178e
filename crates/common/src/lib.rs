//! Shared types for the order/payment saga.

mod types;

pub use types::CorrelationId;
