// marketplace/src/models/order_item.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub product_name: String,
  pub sku: String,
  pub unit_price: Decimal,
  pub quantity: i32,
  pub total_price: Decimal, // unit_price * quantity
}
