// marketplace/src/models/order.rs

use super::address::AddressSnapshot;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

/// Payment side of an order. `Pending` moves to exactly one of the other two
/// and stays there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_status_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  Paid,
  PaymentFailed,
}

impl PaymentStatus {
  pub fn is_terminal(self) -> bool {
    !matches!(self, PaymentStatus::Pending)
  }
}

/// Fulfillment lifecycle. Checkout only ever writes `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
}

/// One seller's share of a checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Order {
  pub id: Uuid,
  pub order_number: String,
  pub buyer_org_id: Uuid,
  pub buyer_user_id: Uuid,
  pub seller_org_id: Uuid,
  pub status: OrderStatus,
  pub payment_status: PaymentStatus,
  pub subtotal: Decimal,
  pub tax: Decimal,
  pub shipping: Decimal,
  pub discount: Decimal,
  pub total: Decimal,
  pub currency: String,
  pub gateway_intent_id: Option<String>,
  pub payment_method: Option<String>,
  #[sqlx(json)]
  pub shipping_address: AddressSnapshot,
  #[sqlx(json)]
  pub billing_address: AddressSnapshot,
  pub buyer_notes: Option<String>,
  pub paid_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Column list matching [`Order`]'s `FromRow` layout.
pub const ORDER_COLUMNS: &str = "id, order_number, buyer_org_id, buyer_user_id, seller_org_id, status, payment_status, \
   subtotal, tax, shipping, discount, total, currency, gateway_intent_id, payment_method, \
   shipping_address, billing_address, buyer_notes, paid_at, created_at, updated_at";
