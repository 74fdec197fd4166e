// marketplace/src/models/product.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog row as far as checkout and settlement care: owner, price and stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub seller_org_id: Option<Uuid>,
  pub name: String,
  pub sku: String,
  pub price: Decimal,
  pub currency: String,
  pub stock: i32,
}
