mod common;

use common::*;
use paydesk::domain::money::MoneyAmount;
use paydesk::domain::payment::{PaymentMethod, PaymentStatus};
use paydesk::services::settlement::{CallbackResult, InitiatePayment, Requester};
use std::sync::Arc;
use uuid::Uuid;

const DB: &str = "paydesk_test_concurrency";

// Webhook delivery is at-least-once, and deliveries race. The event-id dedup
// plus the CAS update must guarantee exactly one transition and exactly one
// notification no matter how the race resolves.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_event_applies_once() {
    let pool = setup_pool(DB).await;
    let (settlement, notifier) = test_settlement(&pool);
    let user = Uuid::now_v7();
    let order = create_order(&pool, user, Some(50_000)).await;

    let initiated = settlement
        .initiate_payment(InitiatePayment {
            order_id: order,
            amount: MoneyAmount::new(50_000).unwrap(),
            method: PaymentMethod::Card,
            requester: Requester::Client(user),
        })
        .await
        .unwrap();
    let external = StubAdapter::external_ref_for(initiated.payment.id());

    let body = Arc::new(callback_body("evt_race_same", &external, None, "completed", 50_000));
    let sig = Arc::new(sign_body(&body));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let settlement = settlement.clone();
        let body = body.clone();
        let sig = sig.clone();
        handles.push(tokio::spawn(async move {
            settlement
                .apply_provider_callback(PaymentMethod::Card, body.as_bytes(), Some(&sig))
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    let mut duplicates = 0;
    for h in handles {
        match h.await.unwrap() {
            CallbackResult::Applied { .. } => applied += 1,
            CallbackResult::Duplicate => duplicates += 1,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    assert_eq!(applied, 1, "exactly 1 delivery wins");
    assert_eq!(duplicates, 9);
    assert_eq!(notifier.count(), 1, "side effects fired exactly once");

    let row = get_payment_row(&pool, initiated.payment.id()).await.unwrap();
    assert_eq!(row.status, "completed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_events_settle_once() {
    let pool = setup_pool(DB).await;
    let (settlement, notifier) = test_settlement(&pool);
    let user = Uuid::now_v7();
    let order = create_order(&pool, user, Some(80_000)).await;

    let initiated = settlement
        .initiate_payment(InitiatePayment {
            order_id: order,
            amount: MoneyAmount::new(80_000).unwrap(),
            method: PaymentMethod::Card,
            requester: Requester::Client(user),
        })
        .await
        .unwrap();
    let external = StubAdapter::external_ref_for(initiated.payment.id());

    // Five separate events (distinct event ids) all claiming completion.
    let mut handles = Vec::new();
    for i in 0..5 {
        let settlement = settlement.clone();
        let body = callback_body(
            &format!("evt_race_distinct_{i}"),
            &external,
            None,
            "completed",
            80_000,
        );
        handles.push(tokio::spawn(async move {
            let sig = sign_body(&body);
            settlement
                .apply_provider_callback(PaymentMethod::Card, body.as_bytes(), Some(&sig))
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    let mut settled_noops = 0;
    for h in handles {
        match h.await.unwrap() {
            CallbackResult::Applied { .. } => applied += 1,
            CallbackResult::AlreadySettled { .. } => settled_noops += 1,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    assert_eq!(applied, 1, "only one event observes pending -> completed");
    assert_eq!(settled_noops, 4);
    assert_eq!(notifier.count(), 1);

    let balance = settlement.get_balance(order).await.unwrap();
    assert_eq!(balance.paid_cents, 80_000, "credited exactly once");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conflicting_outcomes_resolve_to_single_terminal_state() {
    let pool = setup_pool(DB).await;
    let (settlement, notifier) = test_settlement(&pool);
    let user = Uuid::now_v7();
    let order = create_order(&pool, user, Some(10_000)).await;

    let initiated = settlement
        .initiate_payment(InitiatePayment {
            order_id: order,
            amount: MoneyAmount::new(10_000).unwrap(),
            method: PaymentMethod::Card,
            requester: Requester::Client(user),
        })
        .await
        .unwrap();
    let external = StubAdapter::external_ref_for(initiated.payment.id());

    // A success and a failure racing for the same payment: one wins, the
    // other must observe the terminal row, not overwrite it.
    let mut handles = Vec::new();
    for (i, status) in ["completed", "failed"].iter().enumerate() {
        let settlement = settlement.clone();
        let body = callback_body(&format!("evt_conflict_{i}"), &external, None, status, 10_000);
        handles.push(tokio::spawn(async move {
            let sig = sign_body(&body);
            settlement
                .apply_provider_callback(PaymentMethod::Card, body.as_bytes(), Some(&sig))
                .await
                .unwrap()
        }));
    }

    let mut applied = 0;
    for h in handles {
        match h.await.unwrap() {
            CallbackResult::Applied { .. } => applied += 1,
            CallbackResult::AlreadySettled { .. } => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(notifier.count(), 1);

    let row = get_payment_row(&pool, initiated.payment.id()).await.unwrap();
    assert!(row.status == "completed" || row.status == "failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_submit_without_guard_creates_separate_pending_rows() {
    let pool = setup_pool(DB).await;
    let (settlement, _) = test_settlement(&pool);
    let user = Uuid::now_v7();
    let order = create_order(&pool, user, Some(20_000)).await;

    // Guard disabled in the test harness: a double-click creates two pending
    // rows, which is acceptable; the stale sweep reclaims the unused one.
    let mut handles = Vec::new();
    for _ in 0..2 {
        let settlement = settlement.clone();
        handles.push(tokio::spawn(async move {
            settlement
                .initiate_payment(InitiatePayment {
                    order_id: order,
                    amount: MoneyAmount::new(20_000).unwrap(),
                    method: PaymentMethod::Card,
                    requester: Requester::Client(user),
                })
                .await
                .unwrap()
        }));
    }
    for h in handles {
        let initiated = h.await.unwrap();
        assert_eq!(*initiated.payment.status(), PaymentStatus::Pending);
    }

    assert_eq!(count_payments(&pool, order).await, 2);

    let balance = settlement.get_balance(order).await.unwrap();
    assert_eq!(balance.paid_cents, 0, "pending rows never count as paid");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refund_races_callback_without_double_side_effects() {
    let pool = setup_pool(DB).await;
    let (settlement, notifier) = test_settlement(&pool);
    let user = Uuid::now_v7();
    let admin = Uuid::now_v7();
    let order = create_order(&pool, user, Some(30_000)).await;

    let initiated = settlement
        .initiate_payment(InitiatePayment {
            order_id: order,
            amount: MoneyAmount::new(30_000).unwrap(),
            method: PaymentMethod::Card,
            requester: Requester::Client(user),
        })
        .await
        .unwrap();
    let payment_id = initiated.payment.id();
    let external = StubAdapter::external_ref_for(payment_id);
    let body = callback_body("evt_rr_init", &external, None, "completed", 30_000);
    settlement
        .apply_provider_callback(PaymentMethod::Card, body.as_bytes(), Some(&sign_body(&body)))
        .await
        .unwrap();

    // Refund concurrently with a redelivered completion callback.
    let s1 = settlement.clone();
    let refund = tokio::spawn(async move { s1.refund(payment_id, admin).await });
    let s2 = settlement.clone();
    let redelivery = tokio::spawn(async move {
        let body = callback_body("evt_rr_late", &external, None, "completed", 30_000);
        let sig = sign_body(&body);
        s2.apply_provider_callback(PaymentMethod::Card, body.as_bytes(), Some(&sig))
            .await
    });

    refund.await.unwrap().unwrap();
    let redelivery = redelivery.await.unwrap().unwrap();
    assert!(matches!(redelivery, CallbackResult::AlreadySettled { .. }));

    let row = get_payment_row(&pool, payment_id).await.unwrap();
    assert_eq!(row.status, "refunded");
    // One completion, one refund, nothing doubled.
    let events = notifier.events();
    assert_eq!(
        events.iter().filter(|e| *e == "payment.completed").count(),
        1
    );
    assert_eq!(events.iter().filter(|e| *e == "payment.refunded").count(), 1);
}
