// marketplace/src/models/cart_item.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A buyer's cart item resolved against the catalog: the seller, price and
/// sku are the product's values at checkout time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CartLine {
  pub cart_item_id: Uuid,
  pub product_id: Uuid,
  /// `None` when the product has lost its seller reference.
  pub seller_org_id: Option<Uuid>,
  pub product_name: String,
  pub sku: String,
  pub unit_price: Decimal,
  pub currency: String,
  pub quantity: i32,
}

impl CartLine {
  pub fn line_total(&self) -> Decimal {
    self.unit_price * Decimal::from(self.quantity)
  }
}
