//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order tracked by the saga.
///
/// State transitions:
/// ```text
/// Pending ──Done──► Paid
///    │                │
///    └──Error──┬──────┘ (late rollback, policy dependent)
///              ▼
///          RolledBack (entry removed from the ledger)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order registered, waiting for the payment outcome.
    #[default]
    Pending,

    /// Payment confirmed (terminal state).
    Paid,

    /// Payment failed and the order was compensated (terminal state).
    ///
    /// Rolled-back orders are removed from the ledger; this status only
    /// appears on the order value handed back by the removal.
    RolledBack,
}

impl OrderStatus {
    /// Returns true if the order still occupies its key in the ledger.
    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Paid)
    }

    /// Returns true if the order can be marked paid.
    pub fn can_pay(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Paid => "Paid",
            OrderStatus::RolledBack => "RolledBack",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
