// marketplace/src/models/gateway_event.rs

//! Payment gateway webhook envelope.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
  pub id: String,
  #[serde(rename = "type")]
  pub event_type: String,
  #[serde(default)]
  pub created: i64,
  #[serde(default)]
  pub data: GatewayEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayEventData {
  #[serde(default)]
  pub object: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  PaymentSucceeded,
  PaymentFailed,
  Unhandled,
}

impl GatewayEvent {
  pub fn kind(&self) -> EventKind {
    match self.event_type.as_str() {
      PAYMENT_INTENT_SUCCEEDED => EventKind::PaymentSucceeded,
      PAYMENT_INTENT_FAILED => EventKind::PaymentFailed,
      _ => EventKind::Unhandled,
    }
  }

  /// The payment intent carried by `payment_intent.*` events.
  pub fn intent_object(&self) -> Result<IntentObject, serde_json::Error> {
    IntentObject::deserialize(&self.data.object)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IntentObject {
  pub id: String,
  #[serde(default)]
  pub amount: Option<i64>,
  #[serde(default)]
  pub currency: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub payment_method: Option<String>,
  #[serde(default)]
  pub last_payment_error: Option<LastPaymentError>,
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LastPaymentError {
  #[serde(default)]
  pub message: Option<String>,
}

impl IntentObject {
  pub fn failure_message(&self) -> Option<&str> {
    self.last_payment_error.as_ref().and_then(|e| e.message.as_deref())
  }
}
