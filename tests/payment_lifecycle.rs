mod common;

use chrono::{DateTime, Utc};
use common::{create_request, payment_in, Harness};
use payment_orders::domain::payment::{NewPaymentLogEntry, Payment, PaymentLogEntry, PaymentStatus};
use payment_orders::error::PaymentError;
use payment_orders::gateways::mock::{MockBehavior, MockGateway};
use payment_orders::gateways::GatewayOrderState;
use payment_orders::repo::memory_ledger::InMemoryLedger;
use payment_orders::repo::payments_repo::{InsertOutcome, PaymentLedger};
use payment_orders::service::order_sync::{InMemoryOrderBook, OrderPaymentState, UnpaidOutcome};
use payment_orders::service::payment_service::PaymentService;
use payment_orders::service::webhook_processor::WebhookOutcome;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Misses the first open-payment lookup, the way a create does when a
/// concurrent create for the same order has not inserted yet.
struct LaggingOpenLookup {
    inner: InMemoryLedger,
    missed: AtomicBool,
}

#[async_trait::async_trait]
impl PaymentLedger for LaggingOpenLookup {
    async fn insert_payment(&self, payment: &Payment) -> anyhow::Result<InsertOutcome> {
        self.inner.insert_payment(payment).await
    }

    async fn find_payment(&self, payment_id: Uuid) -> anyhow::Result<Option<Payment>> {
        self.inner.find_payment(payment_id).await
    }

    async fn find_by_gateway_order_id(&self, gateway_order_id: &str) -> anyhow::Result<Option<Payment>> {
        self.inner.find_by_gateway_order_id(gateway_order_id).await
    }

    async fn find_open_for_order(&self, order_id: Uuid) -> anyhow::Result<Option<Payment>> {
        if !self.missed.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_open_for_order(order_id).await
    }

    async fn update_payment(&self, payment: &Payment) -> anyhow::Result<Option<Payment>> {
        self.inner.update_payment(payment).await
    }

    async fn append_log(&self, entry: &NewPaymentLogEntry) -> anyhow::Result<PaymentLogEntry> {
        self.inner.append_log(entry).await
    }

    async fn list_logs(&self, payment_id: Uuid) -> anyhow::Result<Vec<PaymentLogEntry>> {
        self.inner.list_logs(payment_id).await
    }

    async fn list_stale_open(&self, updated_before: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<Payment>> {
        self.inner.list_stale_open(updated_before, limit).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn created_payment_starts_pending_with_checkout_url() {
    let h = Harness::new();
    let created = h.create("19.99", "gbp").await;

    assert_eq!(created.status, PaymentStatus::Pending);
    assert!(created.checkout_url.contains(&created.gateway_order_id));

    let payment = h.service.get_status(created.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount, Decimal::new(1999, 2));
    assert_eq!(payment.currency, "GBP");
    assert_eq!(payment.gateway_payment_id.as_deref(), Some(created.gateway_order_id.as_str()));

    let logs = h.service.list_logs(created.payment_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].event, "payment_created");
}

#[tokio::test]
async fn webhook_completion_and_redelivery() {
    let h = Harness::new();
    let created = h.create("19.99", "GBP").await;

    let first = h.deliver("ORDER_COMPLETED", &created.gateway_order_id).await.unwrap();
    assert!(matches!(
        first,
        WebhookOutcome::Applied { status: PaymentStatus::Completed, .. }
    ));
    let completed = h.payment(created.payment_id).await;
    let completed_at = completed.completed_at.unwrap();

    let second = h.deliver("ORDER_COMPLETED", &created.gateway_order_id).await.unwrap();
    assert!(matches!(
        second,
        WebhookOutcome::Rejected { status: PaymentStatus::Completed, .. }
    ));

    let after = h.payment(created.payment_id).await;
    assert_eq!(after.status, PaymentStatus::Completed);
    assert_eq!(after.completed_at, Some(completed_at));
    assert_eq!(after.version, completed.version);

    let webhook_logs: Vec<_> = h
        .service
        .list_logs(created.payment_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.event == "webhook:ORDER_COMPLETED")
        .collect();
    assert_eq!(webhook_logs.len(), 2);
    assert_eq!(webhook_logs[0].old_status, PaymentStatus::Pending);
    assert_eq!(webhook_logs[0].new_status, PaymentStatus::Completed);
    assert_eq!(webhook_logs[1].old_status, PaymentStatus::Completed);
    assert_eq!(webhook_logs[1].new_status, PaymentStatus::Completed);

    let order_id = after.order_id;
    assert_eq!(
        h.orders.state(order_id).await,
        Some(OrderPaymentState::Paid { paid_at: completed_at })
    );
}

#[tokio::test]
async fn polling_picks_up_gateway_outcome() {
    let h = Harness::new();
    let created = h.create("42.00", "EUR").await;
    h.gateway
        .set_order_state(&created.gateway_order_id, GatewayOrderState::Completed)
        .await;

    let payment = h.service.get_status(created.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(matches!(
        h.orders.state(payment.order_id).await,
        Some(OrderPaymentState::Paid { .. })
    ));

    let logs = h.service.list_logs(created.payment_id).await.unwrap();
    assert!(logs.iter().any(|l| l.event == "status_polled"
        && l.old_status == PaymentStatus::Pending
        && l.new_status == PaymentStatus::Completed));

    // terminal payments are not polled again
    let polls = h.gateway.calls("get_order").await;
    h.service.get_status(created.payment_id).await.unwrap();
    assert_eq!(h.gateway.calls("get_order").await, polls);
}

#[tokio::test]
async fn failed_poll_returns_local_record() {
    let h = Harness::new();
    let orphan = payment_in(PaymentStatus::Pending);
    h.ledger.insert_payment(&orphan).await.unwrap();

    let payment = h.service.get_status(orphan.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.version, orphan.version);
}

#[tokio::test]
async fn one_active_payment_per_order() {
    let h = Harness::new();
    let order_id = Uuid::new_v4();
    let first = h
        .service
        .create_payment(create_request(order_id, "10.00", "GBP"))
        .await
        .unwrap();

    let err = h
        .service
        .create_payment(create_request(order_id, "10.00", "GBP"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ActivePaymentExists(id) if id == first.payment_id));
    assert_eq!(h.gateway.calls("create_order").await, 1);

    h.deliver("ORDER_PAYMENT_FAILED", &first.gateway_order_id).await.unwrap();
    let retry = h
        .service
        .create_payment(create_request(order_id, "10.00", "GBP"))
        .await
        .unwrap();
    assert_ne!(retry.payment_id, first.payment_id);
}

#[tokio::test]
async fn ledger_refuses_a_second_open_payment_for_an_order() {
    let ledger = InMemoryLedger::new();
    let first = payment_in(PaymentStatus::Pending);
    assert_eq!(ledger.insert_payment(&first).await.unwrap(), InsertOutcome::Inserted);

    let mut second = payment_in(PaymentStatus::Authorized);
    second.order_id = first.order_id;
    assert_eq!(ledger.insert_payment(&second).await.unwrap(), InsertOutcome::OpenPaymentExists);
    assert!(ledger.find_payment(second.id).await.unwrap().is_none());

    let mut closed = payment_in(PaymentStatus::Failed);
    closed.order_id = first.order_id;
    assert_eq!(ledger.insert_payment(&closed).await.unwrap(), InsertOutcome::Inserted);
}

#[tokio::test]
async fn create_that_loses_the_insert_race_reports_the_winner() {
    let ledger = Arc::new(LaggingOpenLookup {
        inner: InMemoryLedger::new(),
        missed: AtomicBool::new(false),
    });
    let gateway = Arc::new(MockGateway::new(MockBehavior::AlwaysSuccess));
    let service = PaymentService::new(
        ledger.clone(),
        gateway.clone(),
        Arc::new(InMemoryOrderBook::new()),
        None,
    );

    let winner = payment_in(PaymentStatus::Pending);
    ledger.inner.insert_payment(&winner).await.unwrap();

    let err = service
        .create_payment(create_request(winner.order_id, "10.00", "GBP"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ActivePaymentExists(id) if id == winner.id), "{err}");

    // the losing create did reach the gateway, but nothing of it was stored
    assert_eq!(gateway.calls("create_order").await, 1);
    let open = ledger.inner.find_open_for_order(winner.order_id).await.unwrap().unwrap();
    assert_eq!(open.id, winner.id);
    assert_eq!(ledger.inner.list_stale_open(Utc::now(), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_create_requests_never_reach_the_gateway() {
    let h = Harness::new();

    let cases = [
        ("0", "GBP"),
        ("-5.00", "GBP"),
        ("10.001", "GBP"),
        ("10.00", "POUND"),
        ("79228162514264337593543950335", "GBP"),
    ];
    for (amount, currency) in cases {
        let err = h
            .service
            .create_payment(create_request(Uuid::new_v4(), amount, currency))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation(_)), "{amount} {currency}: {err}");
    }

    let mut missing_email = create_request(Uuid::new_v4(), "10.00", "GBP");
    missing_email.customer.email = "  ".to_string();
    assert!(matches!(
        h.service.create_payment(missing_email).await,
        Err(PaymentError::Validation(_))
    ));

    assert_eq!(h.gateway.calls("create_order").await, 0);
}

#[tokio::test]
async fn gateway_rejection_persists_nothing() {
    let h = Harness::with_behavior(MockBehavior::AlwaysDecline);
    let order_id = Uuid::new_v4();

    let err = h
        .service
        .create_payment(create_request(order_id, "10.00", "GBP"))
        .await
        .unwrap_err();
    match err {
        PaymentError::Gateway { status, ref message, .. } => {
            assert_eq!(status, 400);
            assert_eq!(message, "mock decline");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(h.ledger.find_open_for_order(order_id).await.unwrap().is_none());
}

#[tokio::test]
async fn gateway_timeout_is_distinct_from_rejection() {
    let h = Harness::with_behavior(MockBehavior::AlwaysTimeout);
    let err = h
        .service
        .create_payment(create_request(Uuid::new_v4(), "10.00", "GBP"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::GatewayTimeout(_)));
}

#[tokio::test]
async fn capture_completes_an_authorized_payment() {
    let h = Harness::new();
    let created = h.create("75.50", "GBP").await;

    let err = h.service.capture(created.payment_id).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::IllegalTransition { from: PaymentStatus::Pending, to: PaymentStatus::Completed }
    ));
    assert_eq!(h.gateway.calls("capture").await, 0);

    h.deliver("ORDER_AUTHORISED", &created.gateway_order_id).await.unwrap();
    let captured = h.service.capture(created.payment_id).await.unwrap();
    assert_eq!(captured.status, PaymentStatus::Completed);
    assert!(captured.completed_at.is_some());
    assert!(matches!(
        h.orders.state(captured.order_id).await,
        Some(OrderPaymentState::Paid { .. })
    ));

    let logs = h.service.list_logs(created.payment_id).await.unwrap();
    let capture_log = logs.iter().find(|l| l.event == "payment_captured").unwrap();
    assert_eq!(capture_log.metadata["gateway_state"], "completed");

    assert!(h.service.capture(created.payment_id).await.is_err());
}

#[tokio::test]
async fn cancel_only_applies_to_pending() {
    let h = Harness::new();
    let created = h.create("12.00", "GBP").await;

    let cancelled = h.service.cancel(created.payment_id).await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);
    assert_eq!(
        h.orders.state(cancelled.order_id).await,
        Some(OrderPaymentState::Unpaid(UnpaidOutcome::Cancelled))
    );

    let err = h.service.cancel(created.payment_id).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::IllegalTransition { from: PaymentStatus::Cancelled, .. }
    ));
}

#[tokio::test]
async fn stale_open_payments_are_reconciled() {
    let h = Harness::new();
    let done = h.create("5.00", "GBP").await;
    let waiting = h.create("6.00", "GBP").await;
    h.gateway
        .set_order_state(&done.gateway_order_id, GatewayOrderState::Failed)
        .await;

    let summary = h
        .service
        .reconcile_stale(chrono::Duration::zero(), 100)
        .await
        .unwrap();
    assert_eq!(summary.examined, 2);
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.failed, 0);

    let failed = h.payment(done.payment_id).await;
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("do_not_honour"));
    assert_eq!(h.payment(waiting.payment_id).await.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn unknown_payment_is_not_found() {
    let h = Harness::new();
    assert!(matches!(
        h.service.get_status(Uuid::new_v4()).await,
        Err(PaymentError::NotFound(_))
    ));
    assert!(matches!(
        h.service.list_logs(Uuid::new_v4()).await,
        Err(PaymentError::NotFound(_))
    ));
}
