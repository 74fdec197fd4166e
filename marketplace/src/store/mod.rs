// marketplace/src/store/mod.rs

//! Persistence ports used by the pipelines, and their two backends.

pub mod memory;
pub mod postgres;

use crate::models::{
  Address, CartLine, ClaimOutcome, LedgerTransaction, Order, OrderItem, PaymentIntentLink, ProcessedEvent,
  UserContact,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("unique constraint violated: {constraint}")]
  Duplicate { constraint: String },

  #[error("no orders linked to payment intent {0}")]
  IntentNotLinked(String),

  #[error("row not found: {0}")]
  NotFound(String),

  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("database error: {0}")]
  Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
  fn from(err: sqlx::Error) -> Self {
    if let sqlx::Error::Database(db_err) = &err {
      if db_err.is_unique_violation() {
        return StoreError::Duplicate {
          constraint: db_err.constraint().unwrap_or("unknown").to_string(),
        };
      }
    }
    StoreError::Database(err)
  }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Stock change applied by a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
  pub product_id: Uuid,
  pub quantity: i64,
  pub new_stock: i32,
}

#[derive(Debug, Clone)]
pub struct SettleIntent {
  pub intent_id: String,
  pub payment_method: Option<String>,
  pub paid_at: DateTime<Utc>,
}

/// What one `settle_intent` call changed.
#[derive(Debug, Clone, Default)]
pub struct SettlementOutcome {
  /// Orders moved from pending to paid by this call, as stored afterwards.
  pub settled_orders: Vec<Order>,
  pub already_paid: Vec<Uuid>,
  pub already_failed: Vec<Uuid>,
  pub stock_adjustments: Vec<StockAdjustment>,
  /// Ledger rows written (and balances credited) by this call.
  pub credits: Vec<LedgerTransaction>,
  /// Sum of every link of the intent, in minor units.
  pub intent_amount_minor: i64,
}

impl SettlementOutcome {
  pub fn is_noop(&self) -> bool {
    self.settled_orders.is_empty()
  }
}

#[derive(Debug, Clone, Default)]
pub struct FailureOutcome {
  pub failed_orders: Vec<Order>,
  /// Linked orders already in a terminal payment state.
  pub untouched: Vec<Uuid>,
}

#[async_trait]
pub trait CheckoutStore: Send + Sync {
  async fn cart_lines(&self, buyer_org_id: Uuid, buyer_user_id: Uuid) -> StoreResult<Vec<CartLine>>;

  async fn address(&self, address_id: Uuid) -> StoreResult<Option<Address>>;

  /// Writes the order and all its items, or nothing.
  async fn insert_order_with_items(&self, order: &Order, items: &[OrderItem]) -> StoreResult<()>;

  /// Records the links and sets `gateway_intent_id` on every linked order, atomically.
  async fn attach_intent(&self, intent_id: &str, links: &[PaymentIntentLink]) -> StoreResult<()>;
}

/// Idempotency ledger for gateway events.
#[async_trait]
pub trait EventStore: Send + Sync {
  /// Atomically claims `event_id`. A `claimed` row older than `claim_ttl`
  /// is taken over; any other existing row is a duplicate.
  async fn claim_event(&self, event_id: &str, event_type: &str, claim_ttl: Duration) -> StoreResult<ClaimOutcome>;

  async fn mark_event_applied(&self, event_id: &str) -> StoreResult<()>;

  /// Deletes the `claimed` row taken with `token` so a redelivery can retry.
  /// Applied rows, and claims since taken over by another delivery, stay.
  /// Returns whether a row was deleted.
  async fn release_event(&self, event_id: &str, token: Uuid) -> StoreResult<bool>;

  async fn processed_event(&self, event_id: &str) -> StoreResult<Option<ProcessedEvent>>;
}

#[async_trait]
pub trait SettlementStore: Send + Sync {
  async fn intent_links(&self, intent_id: &str) -> StoreResult<Vec<PaymentIntentLink>>;

  async fn orders_for_intent(&self, intent_id: &str) -> StoreResult<Vec<Order>>;

  /// Marks pending linked orders paid, decrements stock for them, writes
  /// ledger rows and credits balances, in one transaction.
  ///
  /// Fails with [`StoreError::IntentNotLinked`] when the intent has no links.
  async fn settle_intent(&self, command: &SettleIntent) -> StoreResult<SettlementOutcome>;

  /// Marks pending linked orders `payment_failed` with a timeline entry each.
  async fn fail_intent(&self, intent_id: &str, reason: &str) -> StoreResult<FailureOutcome>;

  /// Returns the number of removed cart items.
  async fn clear_cart(&self, buyer_org_id: Uuid, buyer_user_id: Uuid) -> StoreResult<u64>;

  async fn user_contact(&self, user_id: Uuid) -> StoreResult<Option<UserContact>>;

  async fn organization_users(&self, organization_id: Uuid) -> StoreResult<Vec<UserContact>>;
}

/// Everything the service needs from persistence.
pub trait Store: CheckoutStore + EventStore + SettlementStore {}

impl<T: CheckoutStore + EventStore + SettlementStore> Store for T {}

pub(crate) fn payment_received_message(order: &Order) -> String {
  format!(
    "Payment of {} {} received via intent {}",
    order.total,
    order.currency.to_ascii_uppercase(),
    order.gateway_intent_id.as_deref().unwrap_or("unknown")
  )
}

pub(crate) fn payment_failed_message(intent_id: &str, reason: &str) -> String {
  if reason.is_empty() {
    format!("Payment failed for intent {}", intent_id)
  } else {
    format!("Payment failed for intent {}: {}", intent_id, reason)
  }
}
