//! In-memory stand-ins for the services the saga talks to.

pub mod payment;

pub use payment::{PaymentRecord, PaymentSimulator};
