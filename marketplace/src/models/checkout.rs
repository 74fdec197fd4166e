// marketplace/src/models/checkout.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Buyer identity established upstream and forwarded in request headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuyerIdentity {
  pub org_id: Uuid,
  pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
  pub shipping_address_id: Uuid,
  #[serde(default)]
  pub billing_address_id: Option<Uuid>,
  #[serde(default)]
  pub buyer_notes: Option<String>,
}

/// What the client needs to complete payment with the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSummary {
  pub client_secret: String,
  pub order_ids: Vec<Uuid>,
  pub payment_intent_id: String,
  pub amount: i64,
  pub currency: String,
}
