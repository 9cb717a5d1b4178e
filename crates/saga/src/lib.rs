//! Saga coordination for a two-step order → payment transaction.
//!
//! The order service registers an order, asks the payment service to charge
//! it by publishing a Start message, and applies the Done or Error reply
//! that eventually comes back over the message bus:
//! 1. `initiate` creates a Pending order and publishes Start
//! 2. Done marks the order Paid
//! 3. Error compensates by removing the order
//!
//! Delivery is at-least-once, so every transition is idempotent and
//! messages that no longer match the ledger are logged and dropped.

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod envelope;
pub mod error;
pub mod ledger;
pub mod services;
pub mod state;

pub use bus::{BusError, InMemoryMessageBus, MessageBus, MessageHandler};
pub use common::CorrelationId;
pub use config::{LateRollbackPolicy, ORDER_CHANNEL, PAYMENT_CHANNEL, SagaConfig};
pub use coordinator::SagaCoordinator;
pub use envelope::{Action, Envelope, Purchase, Service};
pub use error::{HandlingError, LedgerError, SagaError};
pub use ledger::{Order, OrderLedger};
pub use services::{PaymentRecord, PaymentSimulator};
pub use state::OrderStatus;
