// marketplace/src/models/timeline.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const PAYMENT_RECEIVED: &str = "payment_received";
pub const PAYMENT_FAILED: &str = "payment_failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct OrderTimelineEntry {
  pub id: Uuid,
  pub order_id: Uuid,
  pub event_type: String,
  pub message: String,
  pub created_at: DateTime<Utc>,
}

impl OrderTimelineEntry {
  pub fn new(order_id: Uuid, event_type: &str, message: impl Into<String>) -> Self {
    Self {
      id: Uuid::new_v4(),
      order_id,
      event_type: event_type.to_string(),
      message: message.into(),
      created_at: Utc::now(),
    }
  }
}
