// marketplace/src/services/order_numbers.rs
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const PREFIX: &str = "MKT";

/// `MKT-YYYYMMDD-XXXXXXXXXXXX`: the date for humans and 48 random bits from a
/// v4 UUID. Uniqueness is still enforced by the store.
pub fn generate(now: DateTime<Utc>) -> String {
  let suffix = Uuid::new_v4().simple().to_string();
  format!("{}-{}-{}", PREFIX, now.format("%Y%m%d"), suffix[..12].to_ascii_uppercase())
}
