//! End-to-end tests: coordinator and payment service talking over the bus.

use std::sync::Arc;

use futures_util::future::join_all;
use saga::{
    Envelope, InMemoryMessageBus, ORDER_CHANNEL, OrderStatus, PAYMENT_CHANNEL, PaymentSimulator,
    SagaCoordinator, SagaError,
};

struct TestHarness {
    coordinator: Arc<SagaCoordinator<InMemoryMessageBus>>,
    payment: Arc<PaymentSimulator<InMemoryMessageBus>>,
    bus: InMemoryMessageBus,
}

impl TestHarness {
    async fn new() -> Self {
        let bus = InMemoryMessageBus::new();
        let coordinator = Arc::new(SagaCoordinator::new(bus.clone()));
        let payment = Arc::new(PaymentSimulator::new(bus.clone()));

        coordinator.subscribe().await.unwrap();
        payment.subscribe(PAYMENT_CHANNEL).await.unwrap();

        Self {
            coordinator,
            payment,
            bus,
        }
    }

    async fn status(&self, key: &str) -> Option<OrderStatus> {
        self.coordinator.snapshot().await.get(key).copied()
    }
}

#[tokio::test]
async fn test_happy_path_order_is_paid() {
    let h = TestHarness::new().await;

    let correlation_id = h.coordinator.initiate("alice", 100).await.unwrap();
    h.bus.flush().await;

    assert_eq!(h.status("alice").await, Some(OrderStatus::Paid));
    assert_eq!(h.payment.payment_count().await, 1);

    let record = h.payment.payment(&correlation_id).await.unwrap();
    assert_eq!(record.key, "alice");
    assert_eq!(record.amount, 100);

    let replies = h.bus.published(ORDER_CHANNEL).await;
    assert_eq!(replies, vec![Envelope::done(correlation_id, "alice", 100)]);
}

#[tokio::test]
async fn test_declined_payment_rolls_back_order() {
    let h = TestHarness::new().await;
    h.payment.set_fail_on_charge(true).await;

    h.coordinator.initiate("bob", 30).await.unwrap();
    h.bus.flush().await;

    assert_eq!(h.status("bob").await, None);
    assert!(h.coordinator.snapshot().await.is_empty());
    assert_eq!(h.payment.payment_count().await, 0);
}

#[tokio::test]
async fn test_retry_after_rollback_succeeds() {
    let h = TestHarness::new().await;
    h.payment.set_fail_on_charge(true).await;
    let first = h.coordinator.initiate("bob", 30).await.unwrap();
    h.bus.flush().await;

    h.payment.set_fail_on_charge(false).await;
    let second = h.coordinator.initiate("bob", 30).await.unwrap();
    h.bus.flush().await;

    assert_ne!(first, second);
    assert_eq!(h.status("bob").await, Some(OrderStatus::Paid));
}

#[tokio::test]
async fn test_redelivered_replies_are_idempotent() {
    let h = TestHarness::new().await;
    h.coordinator.initiate("alice", 100).await.unwrap();
    h.bus.flush().await;

    let reply = h.bus.published(ORDER_CHANNEL).await.remove(0);
    let body = reply.encode().unwrap();
    h.bus.deliver(ORDER_CHANNEL, &body).await;
    h.bus.deliver(ORDER_CHANNEL, &body).await;

    assert_eq!(h.status("alice").await, Some(OrderStatus::Paid));
    assert_eq!(h.coordinator.snapshot().await.len(), 1);
}

#[tokio::test]
async fn test_stale_error_for_unknown_order_is_harmless() {
    let h = TestHarness::new().await;
    h.coordinator.initiate("alice", 100).await.unwrap();
    h.bus.flush().await;

    let stale = Envelope::error(saga::CorrelationId::new(), "bob", 10);
    h.bus.deliver(ORDER_CHANNEL, &stale.encode().unwrap()).await;
    h.bus.deliver(ORDER_CHANNEL, b"garbage").await;

    assert_eq!(h.status("alice").await, Some(OrderStatus::Paid));
    assert_eq!(h.status("bob").await, None);
}

#[tokio::test]
async fn test_duplicate_creation_while_pending() {
    let bus = InMemoryMessageBus::new();
    let coordinator = Arc::new(SagaCoordinator::new(bus.clone()));
    coordinator.subscribe().await.unwrap();

    coordinator.initiate("alice", 100).await.unwrap();
    let result = coordinator.initiate("alice", 50).await;

    assert!(matches!(result, Err(SagaError::DuplicateOrder(_))));
    let order = coordinator.order("alice").await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.amount, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_sagas_all_complete() {
    let h = TestHarness::new().await;

    let results = join_all((0..100u64).map(|i| {
        let coordinator = h.coordinator.clone();
        tokio::spawn(async move { coordinator.initiate(&format!("customer-{i}"), i).await })
    }))
    .await;
    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));

    h.bus.flush().await;

    let snapshot = h.coordinator.snapshot().await;
    assert_eq!(snapshot.len(), 100);
    assert!(snapshot.values().all(|s| *s == OrderStatus::Paid));
    assert_eq!(h.payment.payment_count().await, 100);
}
