// marketplace/src/pipelines/common_steps.rs

//! Post-settlement side effects. Both run as best-effort steps; their
//! errors are logged by the pipeline and never fail the delivery.

use crate::errors::Result as AppResult;
use crate::models::{Order, UserContact};
use crate::pipelines::contexts::SettlementCtxData;
use crate::services::email::EmailMessage;
use crate::services::notifications::{NotificationEvent, Notifier, ORDER_PAID};
use crate::store::Store;
use futures_util::future::join_all;
use serde_json::json;
use std::fmt::Write as _;
use stepflow::{ContextData, PipelineControl};
use tracing::{info, instrument, warn};

/// Renders the receipt for the orders paid by one intent.
pub fn render_receipt(buyer: &UserContact, sender: &str, orders: &[Order]) -> EmailMessage {
  let mut text_lines = String::new();
  let mut html_items = String::new();
  for order in orders {
    let currency = order.currency.to_ascii_uppercase();
    let _ = writeln!(text_lines, "- {}: {} {}", order.order_number, order.total, currency);
    let _ = write!(html_items, "<li>{}: {} {}</li>", order.order_number, order.total, currency);
  }

  EmailMessage {
    to: buyer.email.clone(),
    from: sender.to_string(),
    subject: format!("Payment received for {} order(s)", orders.len()),
    html_body: format!(
      "<p>Hi {},</p><p>We received your payment for:</p><ul>{}</ul><p>Sellers will ship separately.</p>",
      buyer.display_name, html_items
    ),
    text_body: format!(
      "Hi {},\n\nWe received your payment for:\n{}\nSellers will ship separately.\n",
      buyer.display_name, text_lines
    ),
  }
}

#[instrument(name = "settlement::send_buyer_receipt", skip_all)]
pub async fn send_buyer_receipt_step(ctx_data: ContextData<SettlementCtxData>) -> AppResult<PipelineControl> {
  let (store, mailer, sender, orders) = {
    let guard = ctx_data.read();
    (
      guard.app_state.store.clone(),
      guard.app_state.mailer.clone(),
      guard.app_state.config.email_sender.clone(),
      guard.outcome.as_ref().map(|o| o.settled_orders.clone()).unwrap_or_default(),
    )
  };
  let Some(buyer_user_id) = orders.first().map(|o| o.buyer_user_id) else {
    return Ok(PipelineControl::Continue);
  };

  let Some(buyer) = store.user_contact(buyer_user_id).await? else {
    warn!(%buyer_user_id, "Buyer contact not found; receipt not sent.");
    return Ok(PipelineControl::Continue);
  };

  let message = render_receipt(&buyer, &sender, &orders);
  let sent = mailer.send(&message).await?;
  info!(message_id = %sent.message_id, to = %sent.to, orders = orders.len(), "Buyer receipt sent.");

  ctx_data.write().receipt_sent = true;
  Ok(PipelineControl::Continue)
}

async fn notify_seller(store: &dyn Store, notifier: &dyn Notifier, intent_id: &str, order: &Order) -> AppResult<bool> {
  let recipients: Vec<_> = store
    .organization_users(order.seller_org_id)
    .await?
    .into_iter()
    .map(|user| user.id)
    .collect();
  if recipients.is_empty() {
    warn!(seller_org_id = %order.seller_org_id, "Seller organization has no users to notify.");
    return Ok(false);
  }

  notifier
    .emit(NotificationEvent {
      event_type: ORDER_PAID.to_string(),
      organization_id: order.seller_org_id,
      payload: json!({
        "intent_id": intent_id,
        "order_id": order.id,
        "order_number": order.order_number,
        "total": order.total.to_string(),
        "currency": order.currency,
      }),
      recipients,
    })
    .await?;
  Ok(true)
}

/// Notifies every seller concurrently, each under the best-effort budget,
/// so one slow seller cannot hold up the others.
#[instrument(name = "settlement::notify_sellers", skip_all)]
pub async fn notify_sellers_step(ctx_data: ContextData<SettlementCtxData>) -> AppResult<PipelineControl> {
  let (store, notifier, budget, intent_id, orders) = {
    let guard = ctx_data.read();
    (
      guard.app_state.store.clone(),
      guard.app_state.notifier.clone(),
      guard.app_state.config.best_effort_timeout,
      guard.intent.id.clone(),
      guard.outcome.as_ref().map(|o| o.settled_orders.clone()).unwrap_or_default(),
    )
  };

  let tasks = orders.into_iter().map(|order| {
    let store = store.clone();
    let notifier = notifier.clone();
    let intent_id = intent_id.clone();
    async move {
      let result = tokio::time::timeout(
        budget,
        notify_seller(store.as_ref(), notifier.as_ref(), &intent_id, &order),
      )
      .await;
      (order.seller_org_id, result)
    }
  });

  let mut delivered = 0;
  for (seller_org_id, result) in join_all(tasks).await {
    match result {
      Ok(Ok(true)) => delivered += 1,
      Ok(Ok(false)) => {}
      Ok(Err(e)) => warn!(%seller_org_id, error = %e, "Seller notification failed."),
      Err(_) => warn!(%seller_org_id, budget_ms = budget.as_millis() as u64, "Seller notification timed out."),
    }
  }

  info!(delivered, "Seller notifications done.");
  ctx_data.write().sellers_notified = delivered;
  Ok(PipelineControl::Continue)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{AddressSnapshot, OrderStatus, PaymentStatus};
  use chrono::Utc;
  use rust_decimal_macros::dec;
  use uuid::Uuid;

  fn snapshot() -> AddressSnapshot {
    AddressSnapshot {
      source_address_id: Uuid::new_v4(),
      recipient_name: "Ada".to_string(),
      line1: "1 Main St".to_string(),
      line2: None,
      city: "Springfield".to_string(),
      region: None,
      postal_code: "12345".to_string(),
      country: "US".to_string(),
    }
  }

  fn order(number: &str, total: rust_decimal::Decimal) -> Order {
    let now = Utc::now();
    Order {
      id: Uuid::new_v4(),
      order_number: number.to_string(),
      buyer_org_id: Uuid::new_v4(),
      buyer_user_id: Uuid::new_v4(),
      seller_org_id: Uuid::new_v4(),
      status: OrderStatus::Processing,
      payment_status: PaymentStatus::Paid,
      subtotal: total,
      tax: dec!(0),
      shipping: dec!(0),
      discount: dec!(0),
      total,
      currency: "USD".to_string(),
      gateway_intent_id: Some("pi_1".to_string()),
      payment_method: None,
      shipping_address: snapshot(),
      billing_address: snapshot(),
      buyer_notes: None,
      paid_at: Some(now),
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn receipt_lists_every_order() {
    let buyer = UserContact {
      id: Uuid::new_v4(),
      organization_id: Uuid::new_v4(),
      email: "buyer@example.com".to_string(),
      display_name: "Ada".to_string(),
    };
    let orders = vec![order("MKT-1", dec!(12.50)), order("MKT-2", dec!(3.00))];

    let message = render_receipt(&buyer, "shop@example.com", &orders);

    assert_eq!(message.to, "buyer@example.com");
    assert_eq!(message.from, "shop@example.com");
    assert_eq!(message.subject, "Payment received for 2 order(s)");
    assert!(message.text_body.contains("- MKT-1: 12.50 USD"));
    assert!(message.html_body.contains("<li>MKT-2: 3.00 USD</li>"));
  }
}
