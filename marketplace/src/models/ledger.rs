// marketplace/src/models/ledger.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Credit of one seller's split for one settled intent. Written once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LedgerTransaction {
  pub id: Uuid,
  pub intent_id: String,
  pub seller_org_id: Uuid,
  pub amount_minor: i64,
  pub currency: String,
  pub order_ids: Vec<Uuid>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SellerBalance {
  pub seller_org_id: Uuid,
  pub currency: String,
  pub available_amount: i64,
  pub updated_at: DateTime<Utc>,
}
