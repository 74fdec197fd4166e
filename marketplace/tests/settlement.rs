// marketplace/tests/settlement.rs
mod common;

use actix_web::ResponseError;
use common::*;
use marketplace_checkout::errors::AppError;
use marketplace_checkout::models::timeline::{PAYMENT_FAILED, PAYMENT_RECEIVED};
use marketplace_checkout::models::{EventStatus, PaymentStatus};
use marketplace_checkout::pipelines::WebhookOutcome;
use marketplace_checkout::store::EventStore;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn assert_settled_once(h: &Harness, market: &Marketplace) {
  let orders = h.store.orders();
  assert!(orders.iter().all(|o| o.payment_status == PaymentStatus::Paid && o.paid_at.is_some()));

  assert_eq!(h.store.transactions().len(), 2);
  assert_eq!(h.store.balance(market.seller_a, "usd").unwrap().available_amount, SELLER_A_TOTAL_MINOR);
  assert_eq!(h.store.balance(market.seller_b, "usd").unwrap().available_amount, SELLER_B_TOTAL_MINOR);

  assert_eq!(h.store.product(market.widget).unwrap().stock, 8);
  assert_eq!(h.store.product(market.gadget).unwrap().stock, 9);
  assert_eq!(h.store.product(market.lamp).unwrap().stock, 0);

  for order in &orders {
    let received: Vec<_> = h
      .store
      .timeline(order.id)
      .into_iter()
      .filter(|t| t.event_type == PAYMENT_RECEIVED)
      .collect();
    assert_eq!(received.len(), 1, "order {} timeline", order.order_number);
  }
}

#[tokio::test]
async fn success_event_settles_every_linked_order() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();

  let outcome = h
    .deliver(intent_event("evt_ok", SUCCEEDED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();

  assert_eq!(outcome, WebhookOutcome::Applied);
  assert_settled_once(&h, &market);
  assert!(h
    .store
    .orders()
    .iter()
    .all(|o| o.payment_method.as_deref() == Some("pm_card_visa")));

  let sent = h.mailer.sent();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].to, market.buyer_email);
  assert_eq!(sent[0].subject, "Payment received for 2 order(s)");

  let emitted = h.notifier.emitted();
  assert_eq!(emitted.len(), 2);
  assert!(emitted.iter().all(|e| e.event_type == "order.paid" && e.recipients.len() == 1));
  assert!(emitted.iter().any(|e| e.organization_id == market.seller_a));
  assert!(emitted.iter().any(|e| e.organization_id == market.seller_b));

  assert_eq!(h.store.cart_size(market.buyer), 0);

  let event = h.store.processed_event("evt_ok").await.unwrap().unwrap();
  assert_eq!(event.status, EventStatus::Applied);
  assert!(event.applied_at.is_some());
}

#[tokio::test]
async fn redelivered_event_is_a_duplicate() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();
  let payload = intent_event("evt_dup", SUCCEEDED, &summary.payment_intent_id, summary.amount);

  assert_eq!(h.deliver(payload.clone()).await.unwrap(), WebhookOutcome::Applied);
  assert_eq!(h.deliver(payload.clone()).await.unwrap(), WebhookOutcome::Duplicate);
  assert_eq!(h.deliver(payload).await.unwrap(), WebhookOutcome::Duplicate);

  assert_settled_once(&h, &market);
  assert_eq!(h.mailer.sent().len(), 1);
  assert_eq!(h.notifier.emitted().len(), 2);
}

#[tokio::test]
async fn new_event_id_for_a_settled_intent_changes_nothing() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();

  h.deliver(intent_event("evt_first", SUCCEEDED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();
  let second = h
    .deliver(intent_event("evt_second", SUCCEEDED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();

  assert_eq!(second, WebhookOutcome::Applied);
  assert_settled_once(&h, &market);
  assert_eq!(h.mailer.sent().len(), 1);
  assert_eq!(h.notifier.emitted().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_of_one_event_apply_once() {
  let h = Arc::new(Harness::new());
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();
  let payload = intent_event("evt_race", SUCCEEDED, &summary.payment_intent_id, summary.amount);

  let handles: Vec<_> = (0..8)
    .map(|_| {
      let h = h.clone();
      let payload = payload.clone();
      tokio::spawn(async move { h.deliver(payload).await })
    })
    .collect();

  let mut applied = 0;
  let mut duplicates = 0;
  for handle in handles {
    match handle.await.unwrap().unwrap() {
      WebhookOutcome::Applied => applied += 1,
      WebhookOutcome::Duplicate => duplicates += 1,
      WebhookOutcome::Ignored => panic!("succeeded event must not be ignored"),
    }
  }

  assert_eq!(applied, 1);
  assert_eq!(duplicates, 7);
  assert_settled_once(&h, &market);
  assert_eq!(h.mailer.sent().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_events_for_one_intent_credit_once() {
  let h = Arc::new(Harness::new());
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();

  let handles: Vec<_> = (0..6)
    .map(|i| {
      let h = h.clone();
      let payload = intent_event(&format!("evt_{}", i), SUCCEEDED, &summary.payment_intent_id, summary.amount);
      tokio::spawn(async move { h.deliver(payload).await })
    })
    .collect();
  for handle in handles {
    assert_eq!(handle.await.unwrap().unwrap(), WebhookOutcome::Applied);
  }

  assert_settled_once(&h, &market);
  assert_eq!(h.mailer.sent().len(), 1);
}

#[tokio::test]
async fn failed_settlement_releases_the_claim_for_retry() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();
  let payload = intent_event("evt_retry", SUCCEEDED, &summary.payment_intent_id, summary.amount);

  h.store.fail_settlements(true);
  let err = h.deliver(payload.clone()).await.unwrap_err();
  assert!(matches!(err, AppError::Store(_)), "got {:?}", err);
  assert_eq!(err.status_code(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
  assert!(h.store.processed_event("evt_retry").await.unwrap().is_none());
  assert!(h.store.orders().iter().all(|o| o.payment_status == PaymentStatus::Pending));
  assert!(h.store.transactions().is_empty());

  h.store.fail_settlements(false);
  assert_eq!(h.deliver(payload).await.unwrap(), WebhookOutcome::Applied);
  assert_settled_once(&h, &market);
}

#[tokio::test]
async fn unlinked_intent_asks_the_gateway_to_retry() {
  let h = Harness::new();
  seed_marketplace(&h.store);

  let err = h
    .deliver(intent_event("evt_early", SUCCEEDED, "pi_unknown", 1000))
    .await
    .unwrap_err();

  assert!(matches!(err, AppError::IntentNotLinked(ref id) if id == "pi_unknown"), "got {:?}", err);
  assert_eq!(err.status_code(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
  assert!(h.store.processed_event("evt_early").await.unwrap().is_none());
}

#[tokio::test]
async fn side_effect_failures_do_not_fail_the_delivery() {
  let h = Harness::with_side_effects(Arc::new(FailingMailer), Arc::new(SlowNotifier(Duration::from_secs(5))));
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();

  let started = Instant::now();
  let outcome = h
    .deliver(intent_event("evt_fx", SUCCEEDED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();

  assert_eq!(outcome, WebhookOutcome::Applied);
  assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
  assert_settled_once(&h, &market);
  assert_eq!(h.store.cart_size(market.buyer), 0);
}

#[tokio::test]
async fn cart_clear_failure_does_not_fail_the_delivery() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();
  h.store.fail_cart_clear(true);

  let outcome = h
    .deliver(intent_event("evt_cart", SUCCEEDED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();

  assert_eq!(outcome, WebhookOutcome::Applied);
  assert_settled_once(&h, &market);
  assert_eq!(h.store.cart_size(market.buyer), 3);
}

#[tokio::test]
async fn failure_event_marks_orders_failed() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();

  let outcome = h
    .deliver(intent_event("evt_declined", FAILED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();

  assert_eq!(outcome, WebhookOutcome::Applied);
  for order in h.store.orders() {
    assert_eq!(order.payment_status, PaymentStatus::PaymentFailed);
    assert!(order.paid_at.is_none());
    let timeline = h.store.timeline(order.id);
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].event_type, PAYMENT_FAILED);
    assert!(timeline[0].message.contains("Your card was declined."));
  }
  assert!(h.store.transactions().is_empty());
  assert!(h.store.balance(market.seller_a, "usd").is_none());
  assert_eq!(h.store.product(market.lamp).unwrap().stock, 1);
  assert!(h.mailer.sent().is_empty());
  assert_eq!(h.store.cart_size(market.buyer), 3);
}

#[tokio::test]
async fn success_after_failure_leaves_failed_orders_alone() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();

  h.deliver(intent_event("evt_fail", FAILED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();
  let outcome = h
    .deliver(intent_event("evt_late_ok", SUCCEEDED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();

  assert_eq!(outcome, WebhookOutcome::Applied);
  assert!(h
    .store
    .orders()
    .iter()
    .all(|o| o.payment_status == PaymentStatus::PaymentFailed));
  assert!(h.store.transactions().is_empty());
  assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn failure_after_success_leaves_paid_orders_alone() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();

  h.deliver(intent_event("evt_paid", SUCCEEDED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();
  h.deliver(intent_event("evt_late_fail", FAILED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();

  assert_settled_once(&h, &market);
  for order in h.store.orders() {
    assert!(h.store.timeline(order.id).iter().all(|t| t.event_type != PAYMENT_FAILED));
  }
}

#[tokio::test]
async fn stock_never_goes_negative() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  // Lamp has stock 1; buy three more.
  h.store.add_cart_item(market.buyer, market.lamp, 3);
  let summary = h.checkout(&market).await.unwrap();

  h.deliver(intent_event("evt_stock", SUCCEEDED, &summary.payment_intent_id, summary.amount))
    .await
    .unwrap();

  assert_eq!(h.store.product(market.lamp).unwrap().stock, 0);
  assert!(h.store.orders().iter().all(|o| o.payment_status == PaymentStatus::Paid));
}

#[tokio::test]
async fn abandoned_claim_can_be_taken_over() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();
  let ttl = h.state.config.webhook_claim_ttl;

  // A worker claimed the event and died.
  h.store.claim_event("evt_stale", SUCCEEDED, ttl).await.unwrap();
  let payload = intent_event("evt_stale", SUCCEEDED, &summary.payment_intent_id, summary.amount);
  assert_eq!(h.deliver(payload.clone()).await.unwrap(), WebhookOutcome::Duplicate);
  assert!(h.store.orders().iter().all(|o| o.payment_status == PaymentStatus::Pending));

  h.store.backdate_claim("evt_stale", ttl + Duration::from_secs(60));
  assert_eq!(h.deliver(payload).await.unwrap(), WebhookOutcome::Applied);
  assert_settled_once(&h, &market);
}

#[tokio::test]
async fn superseded_worker_cannot_release_the_takeover_claim() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();
  let ttl = h.state.config.webhook_claim_ttl;

  // A slow worker holds the claim past its TTL.
  let slow_token = h.store.claim_event("evt_slow", SUCCEEDED, ttl).await.unwrap().token().unwrap();
  h.store.backdate_claim("evt_slow", ttl + Duration::from_secs(60));

  let payload = intent_event("evt_slow", SUCCEEDED, &summary.payment_intent_id, summary.amount);
  assert_eq!(h.deliver(payload.clone()).await.unwrap(), WebhookOutcome::Applied);

  // The slow worker now fails and tries to release what it thinks is its claim.
  assert!(!h.store.release_event("evt_slow", slow_token).await.unwrap());
  let event = h.store.processed_event("evt_slow").await.unwrap().unwrap();
  assert_eq!(event.status, EventStatus::Applied);
  assert_ne!(event.claim_token, slow_token);

  assert_eq!(h.deliver(payload).await.unwrap(), WebhookOutcome::Duplicate);
  assert_settled_once(&h, &market);
}

#[tokio::test]
async fn amount_mismatch_still_settles_by_links() {
  let h = Harness::new();
  let market = seed_marketplace(&h.store);
  let summary = h.checkout(&market).await.unwrap();

  let outcome = h
    .deliver(intent_event("evt_odd", SUCCEEDED, &summary.payment_intent_id, summary.amount + 1))
    .await
    .unwrap();

  assert_eq!(outcome, WebhookOutcome::Applied);
  assert_settled_once(&h, &market);
}
