// marketplace/src/models/address.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Address {
  pub id: Uuid,
  pub organization_id: Uuid,
  pub recipient_name: String,
  pub line1: String,
  pub line2: Option<String>,
  pub city: String,
  pub region: Option<String>,
  pub postal_code: String,
  pub country: String,
}

/// Copy of an address taken when an order is created. Later edits to the
/// address book never reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSnapshot {
  pub source_address_id: Uuid,
  pub recipient_name: String,
  pub line1: String,
  pub line2: Option<String>,
  pub city: String,
  pub region: Option<String>,
  pub postal_code: String,
  pub country: String,
}

impl From<&Address> for AddressSnapshot {
  fn from(address: &Address) -> Self {
    Self {
      source_address_id: address.id,
      recipient_name: address.recipient_name.clone(),
      line1: address.line1.clone(),
      line2: address.line2.clone(),
      city: address.city.clone(),
      region: address.region.clone(),
      postal_code: address.postal_code.clone(),
      country: address.country.clone(),
    }
  }
}
