//! Payment order lifecycle tests.

mod common;

use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};
use common::{stub_callback, Harness, STUB_PROVIDER};
use xcredits_core::{CreditsError, OrderStatus, PageRequest, TransactionSource, UserId};
use xcredits_engine::{CallbackOutcome, OrderConfig};

#[tokio::test]
async fn create_order_prices_credits_and_stores_checkout() {
    let h = Harness::with_config(OrderConfig {
        credit_price_minor: 10,
        ..OrderConfig::default()
    });
    let user = UserId::generate();

    let (order, checkout) = h
        .engines
        .orders
        .create_order(&user, 50, STUB_PROVIDER)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.amount_minor, 500);
    assert_eq!(order.expires_at - order.created_at, Duration::minutes(30));
    assert!(checkout.qr_code.is_some());
    assert!(order.provider_payload.get("checkout").is_some());

    let listed = h
        .engines
        .orders
        .list_orders(&user, PageRequest::new(1, 10))
        .unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].order_no, order.order_no);
}

#[tokio::test]
async fn unknown_provider_is_not_found() {
    let h = Harness::new();
    let err = h
        .engines
        .orders
        .create_order(&UserId::generate(), 10, "carrier-pigeon")
        .await
        .unwrap_err();
    assert!(matches!(err, CreditsError::NotFound { .. }));
}

#[tokio::test]
async fn provider_failure_marks_order_failed() {
    let h = Harness::new();
    let user = UserId::generate();
    h.provider.fail_create.store(true, Ordering::SeqCst);

    let err = h
        .engines
        .orders
        .create_order(&user, 10, STUB_PROVIDER)
        .await
        .unwrap_err();
    assert!(matches!(err, CreditsError::Provider(_)));

    let orders = h
        .engines
        .orders
        .list_orders(&user, PageRequest::new(1, 10))
        .unwrap();
    assert_eq!(orders.items.len(), 1);
    assert_eq!(orders.items[0].status, OrderStatus::Failed);
    assert!(orders.items[0].provider_payload.get("error").is_some());
}

#[tokio::test]
async fn completing_twice_credits_once() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 25, STUB_PROVIDER)
        .await
        .unwrap();

    let paid = h
        .engines
        .orders
        .complete(&order.order_no, "tx-1", Utc::now())
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(paid.paid_at.is_some());

    let again = h
        .engines
        .orders
        .complete(&order.order_no, "tx-1", Utc::now())
        .unwrap_err();
    assert!(matches!(again, CreditsError::InvalidState { .. }));

    let account = h.engines.ledger.balance(&user).unwrap();
    assert_eq!(account.balance, 25);
    let history = h
        .engines
        .ledger
        .history(&user, PageRequest::new(1, 10))
        .unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.items[0].source, TransactionSource::Purchase);
    assert_eq!(history.items[0].source_id, order.order_no);
}

#[tokio::test]
async fn concurrent_completion_credits_once() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 9, STUB_PROVIDER)
        .await
        .unwrap();

    let settled = std::sync::atomic::AtomicUsize::new(0);
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                if h
                    .engines
                    .orders
                    .complete(&order.order_no, "tx", Utc::now())
                    .is_ok()
                {
                    settled.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(settled.load(Ordering::SeqCst), 1);
    assert_eq!(h.engines.ledger.balance(&user).unwrap().balance, 9);
}

#[tokio::test]
async fn late_completion_without_sweep_expires_order() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 10, STUB_PROVIDER)
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(31));
    let err = h
        .engines
        .orders
        .complete(&order.order_no, "tx", Utc::now())
        .unwrap_err();
    assert!(matches!(err, CreditsError::Expired { .. }));

    let stored = h.engines.orders.get_order(&user, &order.order_no).unwrap();
    assert_eq!(stored.status, OrderStatus::Expired);
    assert_eq!(h.engines.ledger.balance(&user).unwrap().balance, 0);
    assert_eq!(h.engines.orders.sweep_expired().unwrap(), 0);
}

#[tokio::test]
async fn sweep_expires_only_overdue_orders() {
    let h = Harness::new();
    let user = UserId::generate();
    let (old, _) = h
        .engines
        .orders
        .create_order(&user, 10, STUB_PROVIDER)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(20));
    let (fresh, _) = h
        .engines
        .orders
        .create_order(&user, 10, STUB_PROVIDER)
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(11));
    assert_eq!(h.engines.orders.sweep_expired().unwrap(), 1);

    let old = h.engines.orders.get_order(&user, &old.order_no).unwrap();
    assert_eq!(old.status, OrderStatus::Expired);
    let err = h
        .engines
        .orders
        .complete(&old.order_no, "tx", Utc::now())
        .unwrap_err();
    assert!(matches!(err, CreditsError::InvalidState { .. }));

    h.engines
        .orders
        .complete(&fresh.order_no, "tx", Utc::now())
        .unwrap();
    assert_eq!(h.engines.ledger.balance(&user).unwrap().balance, 10);
}

#[tokio::test]
async fn cancel_requires_owner_and_pending() {
    let h = Harness::new();
    let owner = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&owner, 10, STUB_PROVIDER)
        .await
        .unwrap();

    let err = h
        .engines
        .orders
        .cancel(&order.order_no, &UserId::generate())
        .unwrap_err();
    assert!(matches!(err, CreditsError::Forbidden));
    assert!(matches!(
        h.engines
            .orders
            .get_order(&UserId::generate(), &order.order_no),
        Err(CreditsError::Forbidden)
    ));

    let cancelled = h.engines.orders.cancel(&order.order_no, &owner).unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let err = h.engines.orders.cancel(&order.order_no, &owner).unwrap_err();
    assert!(matches!(err, CreditsError::InvalidState { .. }));
    let err = h
        .engines
        .orders
        .complete(&order.order_no, "tx", Utc::now())
        .unwrap_err();
    assert!(matches!(err, CreditsError::InvalidState { .. }));
}

#[tokio::test]
async fn callback_settles_then_reports_duplicates_unchanged() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 15, STUB_PROVIDER)
        .await
        .unwrap();
    let body = stub_callback(&order.order_no, order.amount_minor, true);

    let first = h
        .engines
        .orders
        .process_callback(STUB_PROVIDER, &body)
        .unwrap();
    assert!(matches!(first, CallbackOutcome::Settled(ref o) if o.status == OrderStatus::Paid));

    let second = h
        .engines
        .orders
        .process_callback(STUB_PROVIDER, &body)
        .unwrap();
    assert!(matches!(second, CallbackOutcome::Unchanged(_)));
    assert_eq!(h.engines.ledger.balance(&user).unwrap().balance, 15);
}

#[tokio::test]
async fn forged_callback_changes_nothing() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 15, STUB_PROVIDER)
        .await
        .unwrap();

    let mut forged: serde_json::Value =
        serde_json::from_slice(&stub_callback(&order.order_no, order.amount_minor, true)).unwrap();
    forged["signature"] = serde_json::json!("forged");
    let err = h
        .engines
        .orders
        .process_callback(STUB_PROVIDER, &serde_json::to_vec(&forged).unwrap())
        .unwrap_err();
    assert!(matches!(err, CreditsError::SignatureInvalid(_)));

    let err = h
        .engines
        .orders
        .process_callback(STUB_PROVIDER, b"not json")
        .unwrap_err();
    assert!(matches!(err, CreditsError::SignatureInvalid(_)));

    let stored = h.engines.orders.get_order(&user, &order.order_no).unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(h.engines.ledger.balance(&user).unwrap().balance, 0);
}

#[tokio::test]
async fn callback_amount_mismatch_is_rejected() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 15, STUB_PROVIDER)
        .await
        .unwrap();

    let body = stub_callback(&order.order_no, order.amount_minor - 1, true);
    let err = h
        .engines
        .orders
        .process_callback(STUB_PROVIDER, &body)
        .unwrap_err();
    assert!(matches!(err, CreditsError::InvalidState { .. }));

    let stored = h.engines.orders.get_order(&user, &order.order_no).unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn unsuccessful_payment_callback_fails_order() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 15, STUB_PROVIDER)
        .await
        .unwrap();

    let body = stub_callback(&order.order_no, order.amount_minor, false);
    let outcome = h
        .engines
        .orders
        .process_callback(STUB_PROVIDER, &body)
        .unwrap();
    assert!(matches!(outcome, CallbackOutcome::Failed(ref o) if o.status == OrderStatus::Failed));
    assert_eq!(h.engines.ledger.balance(&user).unwrap().balance, 0);
}

#[tokio::test]
async fn credit_failure_after_payment_is_partial() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 15, STUB_PROVIDER)
        .await
        .unwrap();

    h.store.fail_ledger_commits(true);
    let err = h
        .engines
        .orders
        .complete(&order.order_no, "tx", Utc::now())
        .unwrap_err();
    h.store.fail_ledger_commits(false);

    match err {
        CreditsError::PartialFailure {
            operation,
            reference,
            ..
        } => {
            assert_eq!(operation, "complete_order");
            assert_eq!(reference, order.order_no);
        }
        other => panic!("expected partial failure, got {other}"),
    }
    let stored = h.engines.orders.get_order(&user, &order.order_no).unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert_eq!(h.engines.ledger.balance(&user).unwrap().balance, 0);
}

#[tokio::test]
async fn refund_is_recorded_on_paid_orders_only() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 20, STUB_PROVIDER)
        .await
        .unwrap();

    let err = h
        .engines
        .orders
        .refund(&order.order_no, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, CreditsError::InvalidState { .. }));

    h.engines
        .orders
        .complete(&order.order_no, "tx", Utc::now())
        .unwrap();
    let err = h
        .engines
        .orders
        .refund(&order.order_no, order.amount_minor + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CreditsError::InvalidInput(_)));

    let outcome = h.engines.orders.refund(&order.order_no, 5).await.unwrap();
    assert!(outcome.success);
    assert_eq!(h.provider.refunds.load(Ordering::SeqCst), 1);

    let stored = h.engines.orders.get_order(&user, &order.order_no).unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert_eq!(stored.provider_payload["refunds"].as_array().unwrap().len(), 1);
    // Refunds do not claw back credits.
    assert_eq!(h.engines.ledger.balance(&user).unwrap().balance, 20);
}

#[tokio::test]
async fn refunds_append_without_touching_status_or_checkout() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 20, STUB_PROVIDER)
        .await
        .unwrap();
    h.engines
        .orders
        .complete(&order.order_no, "tx-1", Utc::now())
        .unwrap();

    h.engines.orders.refund(&order.order_no, 5).await.unwrap();
    h.engines.orders.refund(&order.order_no, 7).await.unwrap();

    let stored = h.engines.orders.get_order(&user, &order.order_no).unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert!(stored.provider_payload.get("checkout").is_some());
    assert_eq!(stored.provider_payload["transaction_id"], "tx-1");
    let refunds = stored.provider_payload["refunds"].as_array().unwrap();
    assert_eq!(refunds.len(), 2);
    assert_eq!(refunds[1]["amount_minor"], 7);
}

#[tokio::test]
async fn terminal_orders_reject_every_transition() {
    let h = Harness::new();
    let user = UserId::generate();
    let (order, _) = h
        .engines
        .orders
        .create_order(&user, 5, STUB_PROVIDER)
        .await
        .unwrap();
    h.engines.orders.cancel(&order.order_no, &user).unwrap();

    assert!(matches!(
        h.engines.orders.fail(&order.order_no, "late"),
        Err(CreditsError::InvalidState { .. })
    ));
    assert!(matches!(
        h.engines.orders.complete(&order.order_no, "tx", Utc::now()),
        Err(CreditsError::InvalidState { .. })
    ));
    assert!(matches!(
        h.engines.orders.cancel(&order.order_no, &user),
        Err(CreditsError::InvalidState { .. })
    ));
    assert!(matches!(
        h.engines.orders.refund(&order.order_no, 1).await,
        Err(CreditsError::InvalidState { .. })
    ));

    let stored = h.engines.orders.get_order(&user, &order.order_no).unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert_eq!(h.engines.ledger.balance(&user).unwrap().balance, 0);
}
