// marketplace/src/pipelines/contexts.rs

//! Data structs the pipelines run over. Handlers receive them wrapped in
//! `stepflow::ContextData`.

use crate::models::{
  AddressSnapshot, BuyerIdentity, CartLine, CheckoutRequest, GatewayEvent, IntentObject, Order, OrderItem,
};
use crate::services::cart_splitter::SellerGroup;
use crate::services::gateway::GatewayIntent;
use crate::state::AppState;
use crate::store::{FailureOutcome, SettlementOutcome};
use bytes::Bytes;
use uuid::Uuid;

// --- Checkout ---

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub buyer: BuyerIdentity,
  pub request: CheckoutRequest,
  pub currency: String,

  pub cart_lines: Vec<CartLine>,
  pub seller_groups: Vec<SellerGroup>,
  pub shipping_address: Option<AddressSnapshot>,
  pub billing_address: Option<AddressSnapshot>,
  /// Created orders with their items, in seller order.
  pub orders: Vec<(Order, Vec<OrderItem>)>,
  pub intent: Option<GatewayIntent>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, buyer: BuyerIdentity, request: CheckoutRequest) -> Self {
    let currency = app_state.config.default_currency.clone();
    Self {
      app_state,
      buyer,
      request,
      currency,
      cart_lines: Vec::new(),
      seller_groups: Vec::new(),
      shipping_address: None,
      billing_address: None,
      orders: Vec::new(),
      intent: None,
    }
  }
}

// --- Webhook ---

/// How a webhook delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
  /// The event was claimed and its handler ran.
  Applied,
  /// The event id was already claimed or applied; nothing ran.
  Duplicate,
  /// Claimed, but no handler exists for the event type.
  Ignored,
}

#[derive(Clone)]
pub struct WebhookCtxData {
  pub app_state: AppState,
  pub raw_payload: Bytes,
  pub signature_header: Option<String>,

  pub event: Option<GatewayEvent>,
  /// Set for `payment_intent.*` events.
  pub intent: Option<IntentObject>,
  /// Token of the idempotency claim while this delivery holds it.
  pub claim_token: Option<Uuid>,
  pub outcome: Option<WebhookOutcome>,
}

impl WebhookCtxData {
  pub fn new(app_state: AppState, raw_payload: Bytes, signature_header: Option<String>) -> Self {
    Self {
      app_state,
      raw_payload,
      signature_header,
      event: None,
      intent: None,
      claim_token: None,
      outcome: None,
    }
  }

  pub fn event_id(&self) -> Option<&str> {
    self.event.as_ref().map(|e| e.id.as_str())
  }
}

// --- Settlement and failure (routed from the webhook) ---

#[derive(Clone)]
pub struct SettlementCtxData {
  pub app_state: AppState,
  pub event_id: String,
  pub intent: IntentObject,

  pub outcome: Option<SettlementOutcome>,
  pub receipt_sent: bool,
  pub sellers_notified: usize,
  pub cart_cleared: bool,
}

impl SettlementCtxData {
  pub fn new(app_state: AppState, event_id: String, intent: IntentObject) -> Self {
    Self {
      app_state,
      event_id,
      intent,
      outcome: None,
      receipt_sent: false,
      sellers_notified: 0,
      cart_cleared: false,
    }
  }

  /// True when this delivery moved no order to paid.
  pub fn nothing_settled(&self) -> bool {
    self.outcome.as_ref().map_or(true, SettlementOutcome::is_noop)
  }
}

#[derive(Clone)]
pub struct FailureCtxData {
  pub app_state: AppState,
  pub event_id: String,
  pub intent: IntentObject,
  pub outcome: Option<FailureOutcome>,
}
