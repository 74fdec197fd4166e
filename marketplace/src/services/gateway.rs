// marketplace/src/services/gateway.rs

//! Outbound payment gateway port and the bundled mock implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
  #[error("gateway rejected the request: {0}")]
  Rejected(String),

  #[error("gateway unavailable: {0}")]
  Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateIntentRequest {
  pub amount_minor: i64,
  pub currency: String,
  pub metadata: BTreeMap<String, String>,
  /// Lets the gateway deduplicate retries of the same checkout.
  pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIntent {
  pub id: String,
  pub client_secret: String,
  pub amount_minor: i64,
  pub currency: String,
  pub status: String,
  pub account_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_payment_intent(&self, request: CreateIntentRequest) -> Result<GatewayIntent, GatewayError>;
}

/// Gateway stand-in: mints intents locally, records every request and can
/// be switched to fail.
pub struct MockGateway {
  account_id: String,
  failure: Mutex<Option<GatewayError>>,
  requests: Mutex<Vec<CreateIntentRequest>>,
}

impl MockGateway {
  pub fn new(account_id: impl Into<String>) -> Self {
    Self {
      account_id: account_id.into(),
      failure: Mutex::new(None),
      requests: Mutex::new(Vec::new()),
    }
  }

  /// Every following call fails with `error` until cleared with `None`.
  pub fn set_failure(&self, error: Option<GatewayError>) {
    *self.failure.lock() = error;
  }

  pub fn requests(&self) -> Vec<CreateIntentRequest> {
    self.requests.lock().clone()
  }
}

#[async_trait]
impl PaymentGateway for MockGateway {
  #[instrument(skip(self, request), fields(amount = request.amount_minor, currency = %request.currency, account_id = %self.account_id))]
  async fn create_payment_intent(&self, request: CreateIntentRequest) -> Result<GatewayIntent, GatewayError> {
    info!("Simulating creation of payment intent.");
    self.requests.lock().push(request.clone());

    if let Some(err) = self.failure.lock().clone() {
      warn!(error = %err, "Mock gateway failing as configured.");
      return Err(err);
    }
    if request.amount_minor <= 0 {
      return Err(GatewayError::Rejected("amount must be greater than zero".to_string()));
    }

    let intent_id = format!("pi_mock_{}", Uuid::new_v4().simple());
    Ok(GatewayIntent {
      client_secret: format!("{}_secret_{}", intent_id, Uuid::new_v4().simple()),
      id: intent_id,
      amount_minor: request.amount_minor,
      currency: request.currency,
      status: "requires_payment_method".to_string(),
      account_id: self.account_id.clone(),
    })
  }
}
