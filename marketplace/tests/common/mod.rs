// marketplace/tests/common/mod.rs
#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use marketplace_checkout::config::AppConfig;
use marketplace_checkout::errors::Result as AppResult;
use marketplace_checkout::models::{Address, BuyerIdentity, CheckoutRequest, CheckoutSummary, Product, UserContact};
use marketplace_checkout::pipelines::{process_webhook, run_checkout, WebhookOutcome};
use marketplace_checkout::services::email::{EmailMessage, LogMailer, Mailer, SentEmailInfo};
use marketplace_checkout::services::gateway::MockGateway;
use marketplace_checkout::services::notifications::{LogNotifier, NotificationEvent, Notifier};
use marketplace_checkout::services::webhook_signature;
use marketplace_checkout::state::AppState;
use marketplace_checkout::store::MemoryStore;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const SECRET: &str = "whsec_test_secret";
pub const SUCCEEDED: &str = "payment_intent.succeeded";
pub const FAILED: &str = "payment_intent.payment_failed";

static TRACING: Lazy<()> = Lazy::new(|| {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
  let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING);
}

/// Memory backend, 5.00 flat shipping per seller, 10% tax, 200ms side-effect budget.
pub fn test_config() -> AppConfig {
  AppConfig::from_lookup(|name| {
    let value = match name {
      "STORE_BACKEND" => "memory",
      "WEBHOOK_SECRET" => SECRET,
      "FLAT_SHIPPING_PER_SELLER" => "5.00",
      "FLAT_TAX_RATE" => "0.10",
      "BEST_EFFORT_TIMEOUT_MS" => "200",
      "WEBHOOK_CLAIM_TTL_SECS" => "300",
      _ => return None,
    };
    Some(value.to_string())
  })
  .expect("test configuration must load")
}

pub struct Harness {
  pub state: AppState,
  pub store: Arc<MemoryStore>,
  pub gateway: Arc<MockGateway>,
  pub mailer: Arc<LogMailer>,
  pub notifier: Arc<LogNotifier>,
}

impl Harness {
  pub fn new() -> Self {
    let mailer = Arc::new(LogMailer::new());
    let notifier = Arc::new(LogNotifier::new());
    Self::build(mailer.clone(), notifier.clone(), mailer, notifier)
  }

  /// Same wiring, but the pipelines talk to the given mailer and notifier.
  pub fn with_side_effects(mailer: Arc<dyn Mailer>, notifier: Arc<dyn Notifier>) -> Self {
    Self::build(mailer, notifier, Arc::new(LogMailer::new()), Arc::new(LogNotifier::new()))
  }

  fn build(
    mailer: Arc<dyn Mailer>,
    notifier: Arc<dyn Notifier>,
    log_mailer: Arc<LogMailer>,
    log_notifier: Arc<LogNotifier>,
  ) -> Self {
    setup_tracing();
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::new("acct_test"));
    let state = AppState::new(test_config(), store.clone(), gateway.clone(), mailer, notifier);
    Self {
      state,
      store,
      gateway,
      mailer: log_mailer,
      notifier: log_notifier,
    }
  }

  pub async fn checkout(&self, market: &Marketplace) -> AppResult<CheckoutSummary> {
    run_checkout(&self.state, market.buyer, market.checkout_request()).await
  }

  pub async fn deliver(&self, payload: Vec<u8>) -> AppResult<WebhookOutcome> {
    let header = sign_now(&payload);
    process_webhook(&self.state, Bytes::from(payload), Some(header)).await
  }
}

/// A buyer with three cart lines across two sellers.
///
/// Seller A: 2 x 10.00 + 1 x 5.50 → 25.50 + 5.00 shipping + 2.55 tax = 33.05.
/// Seller B: 1 x 20.00 → 20.00 + 5.00 shipping + 2.00 tax = 27.00.
pub struct Marketplace {
  pub buyer: BuyerIdentity,
  pub buyer_email: String,
  pub seller_a: Uuid,
  pub seller_b: Uuid,
  pub widget: Uuid,
  pub gadget: Uuid,
  pub lamp: Uuid,
  pub shipping_address_id: Uuid,
}

pub const SELLER_A_TOTAL_MINOR: i64 = 3305;
pub const SELLER_B_TOTAL_MINOR: i64 = 2700;
pub const CHECKOUT_TOTAL_MINOR: i64 = SELLER_A_TOTAL_MINOR + SELLER_B_TOTAL_MINOR;

impl Marketplace {
  pub fn checkout_request(&self) -> CheckoutRequest {
    CheckoutRequest {
      shipping_address_id: self.shipping_address_id,
      billing_address_id: None,
      buyer_notes: Some("Leave at the door".to_string()),
    }
  }
}

pub fn product(seller_org_id: Uuid, name: &str, price: Decimal, stock: i32) -> Product {
  Product {
    id: Uuid::new_v4(),
    seller_org_id: Some(seller_org_id),
    name: name.to_string(),
    sku: format!("SKU-{}", name.to_ascii_uppercase()),
    price,
    currency: "usd".to_string(),
    stock,
  }
}

pub fn address(organization_id: Uuid) -> Address {
  Address {
    id: Uuid::new_v4(),
    organization_id,
    recipient_name: "Ada Buyer".to_string(),
    line1: "1 Market Street".to_string(),
    line2: None,
    city: "Springfield".to_string(),
    region: Some("IL".to_string()),
    postal_code: "62701".to_string(),
    country: "US".to_string(),
  }
}

pub fn user(organization_id: Uuid, email: &str) -> UserContact {
  UserContact {
    id: Uuid::new_v4(),
    organization_id,
    email: email.to_string(),
    display_name: email.split('@').next().unwrap_or(email).to_string(),
  }
}

pub fn seed_marketplace(store: &MemoryStore) -> Marketplace {
  let buyer_org = Uuid::new_v4();
  let buyer_contact = user(buyer_org, "buyer@example.com");
  let buyer = BuyerIdentity {
    org_id: buyer_org,
    user_id: buyer_contact.id,
  };
  store.add_user(buyer_contact);

  let seller_a = Uuid::new_v4();
  let seller_b = Uuid::new_v4();
  store.add_user(user(seller_a, "ops@seller-a.example"));
  store.add_user(user(seller_b, "ops@seller-b.example"));

  let widget = product(seller_a, "widget", dec!(10.00), 10);
  let gadget = product(seller_a, "gadget", dec!(5.50), 10);
  let lamp = product(seller_b, "lamp", dec!(20.00), 1);
  let (widget_id, gadget_id, lamp_id) = (widget.id, gadget.id, lamp.id);
  store.add_product(widget);
  store.add_product(gadget);
  store.add_product(lamp);

  store.add_cart_item(buyer, widget_id, 2);
  store.add_cart_item(buyer, gadget_id, 1);
  store.add_cart_item(buyer, lamp_id, 1);

  let shipping = address(buyer_org);
  let shipping_address_id = shipping.id;
  store.add_address(shipping);

  Marketplace {
    buyer,
    buyer_email: "buyer@example.com".to_string(),
    seller_a,
    seller_b,
    widget: widget_id,
    gadget: gadget_id,
    lamp: lamp_id,
    shipping_address_id,
  }
}

pub fn intent_event(event_id: &str, event_type: &str, intent_id: &str, amount: i64) -> Vec<u8> {
  let mut object = json!({
    "id": intent_id,
    "object": "payment_intent",
    "amount": amount,
    "currency": "usd",
    "status": if event_type == SUCCEEDED { "succeeded" } else { "requires_payment_method" },
    "payment_method": "pm_card_visa",
  });
  if event_type == FAILED {
    object["last_payment_error"] = json!({ "message": "Your card was declined." });
  }
  serde_json::to_vec(&json!({
    "id": event_id,
    "type": event_type,
    "created": Utc::now().timestamp(),
    "data": { "object": object },
  }))
  .expect("event serializes")
}

pub fn sign_now(payload: &[u8]) -> String {
  webhook_signature::sign(payload, SECRET, Utc::now().timestamp()).expect("test secret is valid")
}

/// Mailer whose every send fails.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
  async fn send(&self, message: &EmailMessage) -> anyhow::Result<SentEmailInfo> {
    Err(anyhow!("smtp relay refused mail to {}", message.to))
  }
}

/// Notifier that takes longer than any best-effort budget used in tests.
pub struct SlowNotifier(pub Duration);

#[async_trait]
impl Notifier for SlowNotifier {
  async fn emit(&self, _event: NotificationEvent) -> anyhow::Result<()> {
    tokio::time::sleep(self.0).await;
    Ok(())
  }
}
