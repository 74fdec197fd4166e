// marketplace/src/store/postgres.rs

//! PostgreSQL store on sqlx. Multi-row writes run in one transaction.

use super::{
  payment_failed_message, payment_received_message, CheckoutStore, EventStore, FailureOutcome, SettleIntent,
  SettlementOutcome, SettlementStore, StockAdjustment, StoreError, StoreResult,
};
use crate::models::order::ORDER_COLUMNS;
use crate::models::timeline::{PAYMENT_FAILED, PAYMENT_RECEIVED};
use crate::models::{
  Address, CartLine, ClaimOutcome, LedgerTransaction, Order, OrderItem, PaymentIntentLink, PaymentStatus,
  ProcessedEvent, UserContact,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

/// Linked orders of `intent_id`, row-locked for the rest of the transaction.
async fn lock_intent_orders(tx: &mut Transaction<'_, Postgres>, intent_id: &str) -> StoreResult<Vec<Order>> {
  let sql = format!(
    "SELECT {} FROM orders \
     WHERE id IN (SELECT order_id FROM payment_intent_links WHERE intent_id = $1) \
     ORDER BY id FOR UPDATE",
    ORDER_COLUMNS
  );
  Ok(sqlx::query_as::<_, Order>(&sql).bind(intent_id).fetch_all(&mut **tx).await?)
}

async fn insert_timeline(
  tx: &mut Transaction<'_, Postgres>,
  order_id: Uuid,
  event_type: &str,
  message: &str,
) -> StoreResult<()> {
  sqlx::query("INSERT INTO order_timeline (id, order_id, event_type, message) VALUES ($1, $2, $3, $4)")
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(event_type)
    .bind(message)
    .execute(&mut **tx)
    .await?;
  Ok(())
}

#[async_trait]
impl CheckoutStore for PgStore {
  async fn cart_lines(&self, buyer_org_id: Uuid, buyer_user_id: Uuid) -> StoreResult<Vec<CartLine>> {
    let lines = sqlx::query_as::<_, CartLine>(
      "SELECT ci.id AS cart_item_id, ci.product_id, p.seller_org_id, p.name AS product_name, p.sku, \
              p.price AS unit_price, p.currency, ci.quantity \
       FROM cart_items ci JOIN products p ON p.id = ci.product_id \
       WHERE ci.buyer_org_id = $1 AND ci.buyer_user_id = $2 \
       ORDER BY ci.created_at, ci.id",
    )
    .bind(buyer_org_id)
    .bind(buyer_user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(lines)
  }

  async fn address(&self, address_id: Uuid) -> StoreResult<Option<Address>> {
    let address = sqlx::query_as::<_, Address>(
      "SELECT id, organization_id, recipient_name, line1, line2, city, region, postal_code, country \
       FROM addresses WHERE id = $1",
    )
    .bind(address_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(address)
  }

  #[instrument(skip(self, order, items), fields(order_id = %order.id, order_number = %order.order_number, items = items.len()))]
  async fn insert_order_with_items(&self, order: &Order, items: &[OrderItem]) -> StoreResult<()> {
    let mut tx = self.pool.begin().await?;

    sqlx::query(
      "INSERT INTO orders (id, order_number, buyer_org_id, buyer_user_id, seller_org_id, status, payment_status, \
                           subtotal, tax, shipping, discount, total, currency, gateway_intent_id, payment_method, \
                           shipping_address, billing_address, buyer_notes, paid_at, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)",
    )
    .bind(order.id)
    .bind(&order.order_number)
    .bind(order.buyer_org_id)
    .bind(order.buyer_user_id)
    .bind(order.seller_org_id)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.subtotal)
    .bind(order.tax)
    .bind(order.shipping)
    .bind(order.discount)
    .bind(order.total)
    .bind(&order.currency)
    .bind(order.gateway_intent_id.as_deref())
    .bind(order.payment_method.as_deref())
    .bind(Json(&order.shipping_address))
    .bind(Json(&order.billing_address))
    .bind(order.buyer_notes.as_deref())
    .bind(order.paid_at)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *tx)
    .await?;

    for item in items {
      sqlx::query(
        "INSERT INTO order_items (id, order_id, product_id, product_name, sku, unit_price, quantity, total_price) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
      )
      .bind(item.id)
      .bind(item.order_id)
      .bind(item.product_id)
      .bind(&item.product_name)
      .bind(&item.sku)
      .bind(item.unit_price)
      .bind(item.quantity)
      .bind(item.total_price)
      .execute(&mut *tx)
      .await?;
    }

    // An error above drops `tx`, which rolls the order back with its items.
    tx.commit().await?;
    Ok(())
  }

  async fn attach_intent(&self, intent_id: &str, links: &[PaymentIntentLink]) -> StoreResult<()> {
    let mut tx = self.pool.begin().await?;

    for link in links {
      sqlx::query(
        "INSERT INTO payment_intent_links (intent_id, order_id, seller_org_id, amount_minor, currency) \
         VALUES ($1, $2, $3, $4, $5) ON CONFLICT (intent_id, order_id) DO NOTHING",
      )
      .bind(&link.intent_id)
      .bind(link.order_id)
      .bind(link.seller_org_id)
      .bind(link.amount_minor)
      .bind(&link.currency)
      .execute(&mut *tx)
      .await?;
    }

    let order_ids: Vec<Uuid> = links.iter().map(|l| l.order_id).collect();
    let updated = sqlx::query("UPDATE orders SET gateway_intent_id = $1, updated_at = now() WHERE id = ANY($2)")
      .bind(intent_id)
      .bind(&order_ids[..])
      .execute(&mut *tx)
      .await?
      .rows_affected();
    if updated != order_ids.len() as u64 {
      return Err(StoreError::NotFound(format!(
        "{} of {} orders for intent {}",
        order_ids.len() as u64 - updated,
        order_ids.len(),
        intent_id
      )));
    }

    tx.commit().await?;
    Ok(())
  }
}

#[async_trait]
impl EventStore for PgStore {
  #[instrument(skip(self, claim_ttl))]
  async fn claim_event(&self, event_id: &str, event_type: &str, claim_ttl: Duration) -> StoreResult<ClaimOutcome> {
    // A conflicting row is only taken over when it is a stale claim; otherwise
    // nothing is returned.
    let token = Uuid::new_v4();
    let row: Option<(bool,)> = sqlx::query_as(
      "INSERT INTO processed_events (event_id, event_type, status, claim_token, claimed_at) \
       VALUES ($1, $2, 'claimed', $4, now()) \
       ON CONFLICT (event_id) DO UPDATE \
       SET claimed_at = now(), claim_token = EXCLUDED.claim_token, event_type = EXCLUDED.event_type \
       WHERE processed_events.status = 'claimed' \
         AND processed_events.claimed_at < now() - make_interval(secs => $3) \
       RETURNING (xmax = 0) AS inserted",
    )
    .bind(event_id)
    .bind(event_type)
    .bind(claim_ttl.as_secs_f64())
    .bind(token)
    .fetch_optional(&self.pool)
    .await?;

    Ok(match row {
      Some((true,)) => ClaimOutcome::Claimed { token },
      Some((false,)) => {
        info!("Taking over abandoned event claim.");
        ClaimOutcome::Claimed { token }
      }
      None => ClaimOutcome::Duplicate,
    })
  }

  async fn mark_event_applied(&self, event_id: &str) -> StoreResult<()> {
    let updated =
      sqlx::query("UPDATE processed_events SET status = 'applied', applied_at = now() WHERE event_id = $1")
        .bind(event_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
    if updated == 0 {
      return Err(StoreError::NotFound(format!("processed event {}", event_id)));
    }
    Ok(())
  }

  async fn release_event(&self, event_id: &str, token: Uuid) -> StoreResult<bool> {
    let deleted =
      sqlx::query("DELETE FROM processed_events WHERE event_id = $1 AND status = 'claimed' AND claim_token = $2")
        .bind(event_id)
        .bind(token)
        .execute(&self.pool)
        .await?
        .rows_affected();
    Ok(deleted > 0)
  }

  async fn processed_event(&self, event_id: &str) -> StoreResult<Option<ProcessedEvent>> {
    let event = sqlx::query_as::<_, ProcessedEvent>(
      "SELECT event_id, event_type, status, claim_token, claimed_at, applied_at \
       FROM processed_events WHERE event_id = $1",
    )
    .bind(event_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(event)
  }
}

#[async_trait]
impl SettlementStore for PgStore {
  async fn intent_links(&self, intent_id: &str) -> StoreResult<Vec<PaymentIntentLink>> {
    let links = sqlx::query_as::<_, PaymentIntentLink>(
      "SELECT intent_id, order_id, seller_org_id, amount_minor, currency \
       FROM payment_intent_links WHERE intent_id = $1 ORDER BY seller_org_id, order_id",
    )
    .bind(intent_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(links)
  }

  async fn orders_for_intent(&self, intent_id: &str) -> StoreResult<Vec<Order>> {
    let sql = format!(
      "SELECT {} FROM orders \
       WHERE id IN (SELECT order_id FROM payment_intent_links WHERE intent_id = $1) \
       ORDER BY seller_org_id",
      ORDER_COLUMNS
    );
    Ok(sqlx::query_as::<_, Order>(&sql).bind(intent_id).fetch_all(&self.pool).await?)
  }

  #[instrument(skip(self, command), fields(intent_id = %command.intent_id))]
  async fn settle_intent(&self, command: &SettleIntent) -> StoreResult<SettlementOutcome> {
    let mut tx = self.pool.begin().await?;

    let locked = lock_intent_orders(&mut tx, &command.intent_id).await?;
    if locked.is_empty() {
      return Err(StoreError::IntentNotLinked(command.intent_id.clone()));
    }

    let intent_amount_minor: i64 = sqlx::query_scalar(
      "SELECT COALESCE(SUM(amount_minor), 0)::int8 FROM payment_intent_links WHERE intent_id = $1",
    )
    .bind(&command.intent_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut outcome = SettlementOutcome {
      intent_amount_minor,
      ..SettlementOutcome::default()
    };
    let mut pending_ids = Vec::new();
    for order in &locked {
      match order.payment_status {
        PaymentStatus::Pending => pending_ids.push(order.id),
        PaymentStatus::Paid => outcome.already_paid.push(order.id),
        PaymentStatus::PaymentFailed => outcome.already_failed.push(order.id),
      }
    }
    if pending_ids.is_empty() {
      tx.commit().await?;
      return Ok(outcome);
    }

    let update_sql = format!(
      "UPDATE orders SET payment_status = 'paid', paid_at = $2, \
                         payment_method = COALESCE($3, payment_method), updated_at = now() \
       WHERE id = ANY($1) AND payment_status = 'pending' \
       RETURNING {}",
      ORDER_COLUMNS
    );
    outcome.settled_orders = sqlx::query_as::<_, Order>(&update_sql)
      .bind(&pending_ids[..])
      .bind(command.paid_at)
      .bind(command.payment_method.as_deref())
      .fetch_all(&mut *tx)
      .await?;
    let settled_ids: Vec<Uuid> = outcome.settled_orders.iter().map(|o| o.id).collect();

    let quantities: Vec<(Uuid, i64)> = sqlx::query_as(
      "SELECT product_id, SUM(quantity)::int8 FROM order_items \
       WHERE order_id = ANY($1) GROUP BY product_id ORDER BY product_id",
    )
    .bind(&settled_ids[..])
    .fetch_all(&mut *tx)
    .await?;
    for (product_id, quantity) in quantities {
      let new_stock: Option<i32> =
        sqlx::query_scalar("UPDATE products SET stock = GREATEST(0, stock - $2)::int4 WHERE id = $1 RETURNING stock")
          .bind(product_id)
          .bind(quantity)
          .fetch_optional(&mut *tx)
          .await?;
      match new_stock {
        Some(new_stock) => outcome.stock_adjustments.push(StockAdjustment {
          product_id,
          quantity,
          new_stock,
        }),
        None => warn!(%product_id, "Settled item references a missing product; stock untouched."),
      }
    }

    let shares: Vec<(Uuid, String, i64, Vec<Uuid>)> = sqlx::query_as(
      "SELECT seller_org_id, currency, SUM(amount_minor)::int8, array_agg(order_id ORDER BY order_id) \
       FROM payment_intent_links WHERE intent_id = $1 AND order_id = ANY($2) \
       GROUP BY seller_org_id, currency ORDER BY seller_org_id",
    )
    .bind(&command.intent_id)
    .bind(&settled_ids[..])
    .fetch_all(&mut *tx)
    .await?;
    for (seller_org_id, currency, amount_minor, order_ids) in shares {
      let transaction_id = Uuid::new_v4();
      let created_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "INSERT INTO transactions (id, intent_id, seller_org_id, amount_minor, currency, order_ids) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (intent_id, seller_org_id) DO NOTHING RETURNING created_at",
      )
      .bind(transaction_id)
      .bind(&command.intent_id)
      .bind(seller_org_id)
      .bind(amount_minor)
      .bind(&currency)
      .bind(&order_ids[..])
      .fetch_optional(&mut *tx)
      .await?;
      let Some(created_at) = created_at else {
        warn!(%seller_org_id, "Ledger row already present; balance not credited again.");
        continue;
      };

      sqlx::query(
        "INSERT INTO seller_balances (seller_org_id, currency, available_amount, updated_at) \
         VALUES ($1, $2, $3, now()) \
         ON CONFLICT (seller_org_id, currency) DO UPDATE \
         SET available_amount = seller_balances.available_amount + EXCLUDED.available_amount, updated_at = now()",
      )
      .bind(seller_org_id)
      .bind(&currency)
      .bind(amount_minor)
      .execute(&mut *tx)
      .await?;

      outcome.credits.push(LedgerTransaction {
        id: transaction_id,
        intent_id: command.intent_id.clone(),
        seller_org_id,
        amount_minor,
        currency,
        order_ids,
        created_at,
      });
    }

    for order in &outcome.settled_orders {
      insert_timeline(&mut tx, order.id, PAYMENT_RECEIVED, &payment_received_message(order)).await?;
    }

    tx.commit().await?;
    Ok(outcome)
  }

  #[instrument(skip(self, reason))]
  async fn fail_intent(&self, intent_id: &str, reason: &str) -> StoreResult<FailureOutcome> {
    let mut tx = self.pool.begin().await?;

    let locked = lock_intent_orders(&mut tx, intent_id).await?;
    if locked.is_empty() {
      return Err(StoreError::IntentNotLinked(intent_id.to_string()));
    }

    let mut outcome = FailureOutcome::default();
    let pending_ids: Vec<Uuid> = locked
      .iter()
      .filter(|o| {
        let pending = o.payment_status == PaymentStatus::Pending;
        if !pending {
          outcome.untouched.push(o.id);
        }
        pending
      })
      .map(|o| o.id)
      .collect();

    if !pending_ids.is_empty() {
      let sql = format!(
        "UPDATE orders SET payment_status = 'payment_failed', updated_at = now() \
         WHERE id = ANY($1) AND payment_status = 'pending' RETURNING {}",
        ORDER_COLUMNS
      );
      outcome.failed_orders = sqlx::query_as::<_, Order>(&sql)
        .bind(&pending_ids[..])
        .fetch_all(&mut *tx)
        .await?;

      let message = payment_failed_message(intent_id, reason);
      for order in &outcome.failed_orders {
        insert_timeline(&mut tx, order.id, PAYMENT_FAILED, &message).await?;
      }
    }

    tx.commit().await?;
    Ok(outcome)
  }

  async fn clear_cart(&self, buyer_org_id: Uuid, buyer_user_id: Uuid) -> StoreResult<u64> {
    let removed = sqlx::query("DELETE FROM cart_items WHERE buyer_org_id = $1 AND buyer_user_id = $2")
      .bind(buyer_org_id)
      .bind(buyer_user_id)
      .execute(&self.pool)
      .await?
      .rows_affected();
    Ok(removed)
  }

  async fn user_contact(&self, user_id: Uuid) -> StoreResult<Option<UserContact>> {
    let user = sqlx::query_as::<_, UserContact>(
      "SELECT id, organization_id, email, display_name FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(user)
  }

  async fn organization_users(&self, organization_id: Uuid) -> StoreResult<Vec<UserContact>> {
    let users = sqlx::query_as::<_, UserContact>(
      "SELECT id, organization_id, email, display_name FROM users WHERE organization_id = $1 ORDER BY id",
    )
    .bind(organization_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(users)
  }
}
