//! Concurrency-safe ledger of in-flight orders.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::CorrelationId;
use tokio::sync::RwLock;

use crate::error::LedgerError;
use crate::state::OrderStatus;

/// An order tracked by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub key: String,
    pub amount: u64,
    pub status: OrderStatus,
    /// The saga attempt that created this entry.
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    fn pending(key: String, amount: u64) -> Self {
        let now = Utc::now();
        Self {
            key,
            amount,
            status: OrderStatus::Pending,
            correlation_id: CorrelationId::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn into_rolled_back(mut self) -> Self {
        self.status = OrderStatus::RolledBack;
        self.updated_at = Utc::now();
        self
    }
}

/// The single source of truth for order state.
///
/// Every mutation holds the write lock for its whole check-and-update,
/// so no caller can observe a half-applied transition. Rolled-back
/// orders are removed rather than kept as tombstones.
#[derive(Debug, Clone, Default)]
pub struct OrderLedger {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl OrderLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new Pending order with a fresh correlation ID.
    ///
    /// Fails with [`LedgerError::Conflict`] if the key is already live.
    pub async fn create(&self, key: &str, amount: u64) -> Result<Order, LedgerError> {
        let mut orders = self.orders.write().await;

        if let Some(existing) = orders.get(key)
            && existing.status.is_live()
        {
            return Err(LedgerError::Conflict(key.to_string()));
        }

        let order = Order::pending(key.to_string(), amount);
        orders.insert(key.to_string(), order.clone());
        Ok(order)
    }

    /// Transitions a Pending order to Paid.
    ///
    /// Re-applying to a Paid order is a no-op. Returns the status the
    /// order had before the call.
    pub async fn mark_paid(&self, key: &str) -> Result<OrderStatus, LedgerError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(key)
            .ok_or_else(|| LedgerError::NotFound(key.to_string()))?;

        let previous = order.status;
        if previous.can_pay() {
            order.status = OrderStatus::Paid;
            order.updated_at = Utc::now();
        }
        Ok(previous)
    }

    /// Removes the order for `key` regardless of its status.
    ///
    /// Removing an absent key is a no-op and returns `None`.
    pub async fn rollback(&self, key: &str) -> Option<Order> {
        self.orders
            .write()
            .await
            .remove(key)
            .map(Order::into_rolled_back)
    }

    /// Removes the order for `key` only while it is still Pending.
    ///
    /// A Paid order is left in place and reported as
    /// [`LedgerError::AlreadyPaid`]. An absent key is a no-op.
    pub async fn rollback_pending(&self, key: &str) -> Result<Option<Order>, LedgerError> {
        let mut orders = self.orders.write().await;
        match orders.get(key).map(|o| o.status) {
            None => Ok(None),
            Some(OrderStatus::Paid) => Err(LedgerError::AlreadyPaid(key.to_string())),
            Some(_) => Ok(orders.remove(key).map(Order::into_rolled_back)),
        }
    }

    /// Removes the order for `key` only if it was created by the given
    /// saga attempt. Returns true if an entry was removed.
    pub async fn discard(&self, key: &str, correlation_id: &CorrelationId) -> bool {
        let mut orders = self.orders.write().await;
        if orders
            .get(key)
            .is_some_and(|o| &o.correlation_id == correlation_id)
        {
            orders.remove(key);
            true
        } else {
            false
        }
    }

    /// Returns a copy of the order for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<Order> {
        self.orders.read().await.get(key).cloned()
    }

    /// Returns a point-in-time copy of every order's status.
    pub async fn snapshot(&self) -> BTreeMap<String, OrderStatus> {
        self.orders
            .read()
            .await
            .iter()
            .map(|(key, order)| (key.clone(), order.status))
            .collect()
    }

    /// Returns the number of live orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Returns true if the ledger holds no orders.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}
