// marketplace/src/store/memory.rs

//! In-process store. Every operation runs under one mutex, which gives the
//! same atomicity the PostgreSQL transactions give.

use super::{
  payment_failed_message, payment_received_message, CheckoutStore, EventStore, FailureOutcome, SettleIntent,
  SettlementOutcome, SettlementStore, StockAdjustment, StoreError, StoreResult,
};
use crate::models::timeline::{PAYMENT_FAILED, PAYMENT_RECEIVED};
use crate::models::{
  Address, BuyerIdentity, CartLine, ClaimOutcome, EventStatus, LedgerTransaction, Order, OrderItem,
  OrderTimelineEntry, PaymentIntentLink, PaymentStatus, ProcessedEvent, Product, SellerBalance, UserContact,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct CartRow {
  id: Uuid,
  buyer_org_id: Uuid,
  buyer_user_id: Uuid,
  product_id: Uuid,
  quantity: i32,
}

#[derive(Default)]
struct MemoryState {
  products: HashMap<Uuid, Product>,
  cart: Vec<CartRow>,
  addresses: HashMap<Uuid, Address>,
  users: HashMap<Uuid, UserContact>,
  orders: HashMap<Uuid, Order>,
  order_items: Vec<OrderItem>,
  links: Vec<PaymentIntentLink>,
  events: HashMap<String, ProcessedEvent>,
  transactions: Vec<LedgerTransaction>,
  balances: HashMap<(Uuid, String), SellerBalance>,
  timeline: Vec<OrderTimelineEntry>,
}

#[derive(Default)]
struct Faults {
  settlements: AtomicBool,
  order_items: AtomicBool,
  cart_clear: AtomicBool,
  order_number_collisions: AtomicUsize,
}

#[derive(Default)]
pub struct MemoryStore {
  state: Mutex<MemoryState>,
  faults: Faults,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  // --- seeding ---

  pub fn add_product(&self, product: Product) {
    self.state.lock().products.insert(product.id, product);
  }

  pub fn add_cart_item(&self, buyer: BuyerIdentity, product_id: Uuid, quantity: i32) -> Uuid {
    let id = Uuid::new_v4();
    self.state.lock().cart.push(CartRow {
      id,
      buyer_org_id: buyer.org_id,
      buyer_user_id: buyer.user_id,
      product_id,
      quantity,
    });
    id
  }

  pub fn add_address(&self, address: Address) {
    self.state.lock().addresses.insert(address.id, address);
  }

  pub fn add_user(&self, user: UserContact) {
    self.state.lock().users.insert(user.id, user);
  }

  // --- fault switches ---

  /// Makes `settle_intent` and `fail_intent` fail before touching anything.
  pub fn fail_settlements(&self, fail: bool) {
    self.faults.settlements.store(fail, Ordering::SeqCst);
  }

  /// Makes `insert_order_with_items` fail while writing items.
  pub fn fail_order_items(&self, fail: bool) {
    self.faults.order_items.store(fail, Ordering::SeqCst);
  }

  pub fn fail_cart_clear(&self, fail: bool) {
    self.faults.cart_clear.store(fail, Ordering::SeqCst);
  }

  /// Makes the next `count` order inserts collide on the order number.
  pub fn collide_order_numbers(&self, count: usize) {
    self.faults.order_number_collisions.store(count, Ordering::SeqCst);
  }

  /// Moves a claim's timestamp into the past, as if its worker had died.
  pub fn backdate_claim(&self, event_id: &str, by: Duration) {
    if let Some(event) = self.state.lock().events.get_mut(event_id) {
      if let Ok(delta) = chrono::Duration::from_std(by) {
        event.claimed_at -= delta;
      }
    }
  }

  // --- inspection ---

  pub fn order(&self, order_id: Uuid) -> Option<Order> {
    self.state.lock().orders.get(&order_id).cloned()
  }

  pub fn orders(&self) -> Vec<Order> {
    let mut orders: Vec<Order> = self.state.lock().orders.values().cloned().collect();
    orders.sort_by_key(|o| (o.created_at, o.seller_org_id));
    orders
  }

  pub fn order_items(&self, order_id: Uuid) -> Vec<OrderItem> {
    self.state.lock().order_items.iter().filter(|i| i.order_id == order_id).cloned().collect()
  }

  pub fn product(&self, product_id: Uuid) -> Option<Product> {
    self.state.lock().products.get(&product_id).cloned()
  }

  pub fn balance(&self, seller_org_id: Uuid, currency: &str) -> Option<SellerBalance> {
    self.state.lock().balances.get(&(seller_org_id, currency.to_string())).cloned()
  }

  pub fn transactions(&self) -> Vec<LedgerTransaction> {
    self.state.lock().transactions.clone()
  }

  pub fn timeline(&self, order_id: Uuid) -> Vec<OrderTimelineEntry> {
    self.state.lock().timeline.iter().filter(|t| t.order_id == order_id).cloned().collect()
  }

  pub fn processed_events(&self) -> Vec<ProcessedEvent> {
    self.state.lock().events.values().cloned().collect()
  }

  pub fn cart_size(&self, buyer: BuyerIdentity) -> usize {
    self
      .state
      .lock()
      .cart
      .iter()
      .filter(|row| row.buyer_org_id == buyer.org_id && row.buyer_user_id == buyer.user_id)
      .count()
  }

  fn ensure_settlements_enabled(&self) -> StoreResult<()> {
    if self.faults.settlements.load(Ordering::SeqCst) {
      return Err(StoreError::Unavailable("settlement writes are disabled".to_string()));
    }
    Ok(())
  }
}

fn links_for<'a>(links: &'a [PaymentIntentLink], intent_id: &'a str) -> impl Iterator<Item = &'a PaymentIntentLink> {
  links.iter().filter(move |l| l.intent_id == intent_id)
}

#[async_trait]
impl CheckoutStore for MemoryStore {
  async fn cart_lines(&self, buyer_org_id: Uuid, buyer_user_id: Uuid) -> StoreResult<Vec<CartLine>> {
    let state = self.state.lock();
    let mut lines = Vec::new();
    for row in state
      .cart
      .iter()
      .filter(|row| row.buyer_org_id == buyer_org_id && row.buyer_user_id == buyer_user_id)
    {
      let Some(product) = state.products.get(&row.product_id) else {
        warn!(product_id = %row.product_id, "Cart references a missing product; skipping.");
        continue;
      };
      lines.push(CartLine {
        cart_item_id: row.id,
        product_id: product.id,
        seller_org_id: product.seller_org_id,
        product_name: product.name.clone(),
        sku: product.sku.clone(),
        unit_price: product.price,
        currency: product.currency.clone(),
        quantity: row.quantity,
      });
    }
    Ok(lines)
  }

  async fn address(&self, address_id: Uuid) -> StoreResult<Option<Address>> {
    Ok(self.state.lock().addresses.get(&address_id).cloned())
  }

  async fn insert_order_with_items(&self, order: &Order, items: &[OrderItem]) -> StoreResult<()> {
    let mut state = self.state.lock();
    if state.orders.contains_key(&order.id) {
      return Err(StoreError::Duplicate {
        constraint: "orders_pkey".to_string(),
      });
    }
    let forced_collision = self
      .faults
      .order_number_collisions
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
      .is_ok();
    if forced_collision || state.orders.values().any(|o| o.order_number == order.order_number) {
      return Err(StoreError::Duplicate {
        constraint: "orders_order_number_key".to_string(),
      });
    }
    if self.faults.order_items.load(Ordering::SeqCst) {
      return Err(StoreError::Unavailable("order item insert failed".to_string()));
    }

    state.orders.insert(order.id, order.clone());
    state.order_items.extend(items.iter().cloned());
    Ok(())
  }

  async fn attach_intent(&self, intent_id: &str, links: &[PaymentIntentLink]) -> StoreResult<()> {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    if let Some(missing) = links.iter().find(|l| !state.orders.contains_key(&l.order_id)) {
      return Err(StoreError::NotFound(format!("order {}", missing.order_id)));
    }

    let now = Utc::now();
    for link in links {
      if let Some(order) = state.orders.get_mut(&link.order_id) {
        order.gateway_intent_id = Some(intent_id.to_string());
        order.updated_at = now;
      }
      let exists = state
        .links
        .iter()
        .any(|l| l.intent_id == link.intent_id && l.order_id == link.order_id);
      if !exists {
        state.links.push(link.clone());
      }
    }
    Ok(())
  }
}

#[async_trait]
impl EventStore for MemoryStore {
  async fn claim_event(&self, event_id: &str, event_type: &str, claim_ttl: Duration) -> StoreResult<ClaimOutcome> {
    let mut state = self.state.lock();
    let now = Utc::now();
    let token = Uuid::new_v4();
    match state.events.get_mut(event_id) {
      None => {
        state.events.insert(
          event_id.to_string(),
          ProcessedEvent {
            event_id: event_id.to_string(),
            event_type: event_type.to_string(),
            status: EventStatus::Claimed,
            claim_token: token,
            claimed_at: now,
            applied_at: None,
          },
        );
        Ok(ClaimOutcome::Claimed { token })
      }
      Some(event) if event.status == EventStatus::Claimed => {
        let abandoned = (now - event.claimed_at).to_std().map(|age| age > claim_ttl).unwrap_or(false);
        if abandoned {
          info!(event_id, "Taking over abandoned event claim.");
          event.claimed_at = now;
          event.claim_token = token;
          event.event_type = event_type.to_string();
          Ok(ClaimOutcome::Claimed { token })
        } else {
          Ok(ClaimOutcome::Duplicate)
        }
      }
      Some(_) => Ok(ClaimOutcome::Duplicate),
    }
  }

  async fn mark_event_applied(&self, event_id: &str) -> StoreResult<()> {
    let mut state = self.state.lock();
    let event = state
      .events
      .get_mut(event_id)
      .ok_or_else(|| StoreError::NotFound(format!("processed event {}", event_id)))?;
    event.status = EventStatus::Applied;
    event.applied_at = Some(Utc::now());
    Ok(())
  }

  async fn release_event(&self, event_id: &str, token: Uuid) -> StoreResult<bool> {
    let mut state = self.state.lock();
    let owned = state
      .events
      .get(event_id)
      .is_some_and(|e| e.status == EventStatus::Claimed && e.claim_token == token);
    if owned {
      state.events.remove(event_id);
    }
    Ok(owned)
  }

  async fn processed_event(&self, event_id: &str) -> StoreResult<Option<ProcessedEvent>> {
    Ok(self.state.lock().events.get(event_id).cloned())
  }
}

#[async_trait]
impl SettlementStore for MemoryStore {
  async fn intent_links(&self, intent_id: &str) -> StoreResult<Vec<PaymentIntentLink>> {
    Ok(links_for(&self.state.lock().links, intent_id).cloned().collect())
  }

  async fn orders_for_intent(&self, intent_id: &str) -> StoreResult<Vec<Order>> {
    let state = self.state.lock();
    Ok(
      links_for(&state.links, intent_id)
        .filter_map(|l| state.orders.get(&l.order_id).cloned())
        .collect(),
    )
  }

  async fn settle_intent(&self, command: &SettleIntent) -> StoreResult<SettlementOutcome> {
    self.ensure_settlements_enabled()?;
    let mut guard = self.state.lock();
    let state = &mut *guard;

    let links: Vec<PaymentIntentLink> = links_for(&state.links, &command.intent_id).cloned().collect();
    if links.is_empty() {
      return Err(StoreError::IntentNotLinked(command.intent_id.clone()));
    }

    let mut outcome = SettlementOutcome {
      intent_amount_minor: links.iter().map(|l| l.amount_minor).sum(),
      ..SettlementOutcome::default()
    };
    let now = Utc::now();

    for link in &links {
      let Some(order) = state.orders.get_mut(&link.order_id) else {
        continue;
      };
      match order.payment_status {
        PaymentStatus::Pending => {
          order.payment_status = PaymentStatus::Paid;
          order.paid_at = Some(command.paid_at);
          if let Some(method) = &command.payment_method {
            order.payment_method = Some(method.clone());
          }
          order.updated_at = now;
          outcome.settled_orders.push(order.clone());
        }
        PaymentStatus::Paid => outcome.already_paid.push(order.id),
        PaymentStatus::PaymentFailed => outcome.already_failed.push(order.id),
      }
    }
    if outcome.is_noop() {
      return Ok(outcome);
    }
    let settled_ids: Vec<Uuid> = outcome.settled_orders.iter().map(|o| o.id).collect();

    let mut quantities: BTreeMap<Uuid, i64> = BTreeMap::new();
    for item in state.order_items.iter().filter(|i| settled_ids.contains(&i.order_id)) {
      *quantities.entry(item.product_id).or_insert(0) += i64::from(item.quantity);
    }
    for (product_id, quantity) in quantities {
      match state.products.get_mut(&product_id) {
        Some(product) => {
          let remaining = (i64::from(product.stock) - quantity).max(0);
          product.stock = i32::try_from(remaining).unwrap_or(i32::MAX);
          outcome.stock_adjustments.push(StockAdjustment {
            product_id,
            quantity,
            new_stock: product.stock,
          });
        }
        None => warn!(%product_id, "Settled item references a missing product; stock untouched."),
      }
    }

    let mut shares: BTreeMap<(Uuid, String), (i64, Vec<Uuid>)> = BTreeMap::new();
    for link in links.iter().filter(|l| settled_ids.contains(&l.order_id)) {
      let share = shares.entry((link.seller_org_id, link.currency.clone())).or_default();
      share.0 += link.amount_minor;
      share.1.push(link.order_id);
    }
    for ((seller_org_id, currency), (amount_minor, order_ids)) in shares {
      let already_credited = state
        .transactions
        .iter()
        .any(|t| t.intent_id == command.intent_id && t.seller_org_id == seller_org_id);
      if already_credited {
        warn!(%seller_org_id, intent_id = %command.intent_id, "Ledger row already present; balance not credited again.");
        continue;
      }
      let transaction = LedgerTransaction {
        id: Uuid::new_v4(),
        intent_id: command.intent_id.clone(),
        seller_org_id,
        amount_minor,
        currency: currency.clone(),
        order_ids,
        created_at: now,
      };
      state.transactions.push(transaction.clone());
      let balance = state
        .balances
        .entry((seller_org_id, currency.clone()))
        .or_insert_with(|| SellerBalance {
          seller_org_id,
          currency,
          available_amount: 0,
          updated_at: now,
        });
      balance.available_amount += amount_minor;
      balance.updated_at = now;
      outcome.credits.push(transaction);
    }

    for order in &outcome.settled_orders {
      state
        .timeline
        .push(OrderTimelineEntry::new(order.id, PAYMENT_RECEIVED, payment_received_message(order)));
    }
    Ok(outcome)
  }

  async fn fail_intent(&self, intent_id: &str, reason: &str) -> StoreResult<FailureOutcome> {
    self.ensure_settlements_enabled()?;
    let mut guard = self.state.lock();
    let state = &mut *guard;

    let order_ids: Vec<Uuid> = links_for(&state.links, intent_id).map(|l| l.order_id).collect();
    if order_ids.is_empty() {
      return Err(StoreError::IntentNotLinked(intent_id.to_string()));
    }

    let mut outcome = FailureOutcome::default();
    let now = Utc::now();
    for order_id in order_ids {
      let Some(order) = state.orders.get_mut(&order_id) else {
        continue;
      };
      if order.payment_status.is_terminal() {
        outcome.untouched.push(order.id);
        continue;
      }
      order.payment_status = PaymentStatus::PaymentFailed;
      order.updated_at = now;
      outcome.failed_orders.push(order.clone());
      state
        .timeline
        .push(OrderTimelineEntry::new(order_id, PAYMENT_FAILED, payment_failed_message(intent_id, reason)));
    }
    Ok(outcome)
  }

  async fn clear_cart(&self, buyer_org_id: Uuid, buyer_user_id: Uuid) -> StoreResult<u64> {
    if self.faults.cart_clear.load(Ordering::SeqCst) {
      return Err(StoreError::Unavailable("cart store unavailable".to_string()));
    }
    let mut state = self.state.lock();
    let before = state.cart.len();
    state
      .cart
      .retain(|row| !(row.buyer_org_id == buyer_org_id && row.buyer_user_id == buyer_user_id));
    Ok((before - state.cart.len()) as u64)
  }

  async fn user_contact(&self, user_id: Uuid) -> StoreResult<Option<UserContact>> {
    Ok(self.state.lock().users.get(&user_id).cloned())
  }

  async fn organization_users(&self, organization_id: Uuid) -> StoreResult<Vec<UserContact>> {
    let mut users: Vec<UserContact> = self
      .state
      .lock()
      .users
      .values()
      .filter(|u| u.organization_id == organization_id)
      .cloned()
      .collect();
    users.sort_by_key(|u| u.id);
    Ok(users)
  }
}
