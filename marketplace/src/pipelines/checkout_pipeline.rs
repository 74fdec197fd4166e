// marketplace/src/pipelines/checkout_pipeline.rs

//! Cart → per-seller orders → one gateway intent → durable intent links.

use crate::config::AppConfig;
use crate::errors::{AppError, Result as AppResult};
use crate::models::money::to_minor_units;
use crate::models::{
  AddressSnapshot, BuyerIdentity, CheckoutRequest, CheckoutSummary, Order, OrderItem, OrderStatus, PaymentIntentLink,
  PaymentIntentRecord, PaymentStatus,
};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::services::cart_splitter::{split_cart, SellerGroup};
use crate::services::gateway::CreateIntentRequest;
use crate::services::order_numbers;
use crate::state::AppState;
use crate::store::{Store, StoreError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use stepflow::{ContextData, Pipeline, PipelineControl, PipelineResult, Registry, StepDef};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const ORDER_NUMBER_ATTEMPTS: usize = 3;
const METADATA_VALUE_LIMIT: usize = 500;

/// Fields shared by every order of one checkout.
struct OrderDraft {
  buyer: BuyerIdentity,
  currency: String,
  shipping_address: AddressSnapshot,
  billing_address: AddressSnapshot,
  buyer_notes: Option<String>,
}

fn build_order(draft: &OrderDraft, group: &SellerGroup, order_number: String, now: DateTime<Utc>) -> (Order, Vec<OrderItem>) {
  let order_id = Uuid::new_v4();
  let items = group
    .lines
    .iter()
    .map(|line| OrderItem {
      id: Uuid::new_v4(),
      order_id,
      product_id: line.product_id,
      product_name: line.product_name.clone(),
      sku: line.sku.clone(),
      unit_price: line.unit_price,
      quantity: line.quantity,
      total_price: line.line_total(),
    })
    .collect();

  let order = Order {
    id: order_id,
    order_number,
    buyer_org_id: draft.buyer.org_id,
    buyer_user_id: draft.buyer.user_id,
    seller_org_id: group.seller_org_id,
    status: OrderStatus::Pending,
    payment_status: PaymentStatus::Pending,
    subtotal: group.subtotal,
    tax: group.tax,
    shipping: group.shipping,
    discount: group.discount,
    total: group.total,
    currency: draft.currency.clone(),
    gateway_intent_id: None,
    payment_method: None,
    shipping_address: draft.shipping_address.clone(),
    billing_address: draft.billing_address.clone(),
    buyer_notes: draft.buyer_notes.clone(),
    paid_at: None,
    created_at: now,
    updated_at: now,
  };
  (order, items)
}

/// Inserts the group's order, drawing a new order number on a collision.
async fn insert_seller_order(
  store: &dyn Store,
  draft: &OrderDraft,
  group: &SellerGroup,
) -> AppResult<(Order, Vec<OrderItem>)> {
  let mut attempt = 0;
  loop {
    attempt += 1;
    let now = Utc::now();
    let (order, items) = build_order(draft, group, order_numbers::generate(now), now);
    match store.insert_order_with_items(&order, &items).await {
      Ok(()) => return Ok((order, items)),
      Err(StoreError::Duplicate { constraint }) if attempt < ORDER_NUMBER_ATTEMPTS => {
        warn!(%constraint, attempt, order_number = %order.order_number, "Order insert collided; retrying with a new number.");
      }
      Err(e) => return Err(e.into()),
    }
  }
}

async fn load_buyer_address(store: &dyn Store, buyer: BuyerIdentity, address_id: Uuid) -> AppResult<AddressSnapshot> {
  let address = store
    .address(address_id)
    .await?
    .ok_or_else(|| AppError::Validation(format!("Address {} not found", address_id)))?;
  if address.organization_id != buyer.org_id {
    warn!(%address_id, buyer_org_id = %buyer.org_id, "Address belongs to another organization.");
    return Err(AppError::Validation(format!(
      "Address {} does not belong to the buyer organization",
      address_id
    )));
  }
  Ok(AddressSnapshot::from(&address))
}

fn minor_units(amount: Decimal, currency: &str) -> AppResult<i64> {
  to_minor_units(amount, currency).ok_or_else(|| AppError::Validation(format!("Amount {} is out of range", amount)))
}

/// Gateway metadata. The link table is authoritative; this is a debugging
/// aid, so oversized values are dropped rather than failing the checkout.
pub fn build_intent_metadata(
  buyer: BuyerIdentity,
  order_ids: &[Uuid],
  splits: &BTreeMap<Uuid, i64>,
) -> BTreeMap<String, String> {
  let mut metadata = BTreeMap::new();
  metadata.insert("buyer_org_id".to_string(), buyer.org_id.to_string());
  metadata.insert("buyer_user_id".to_string(), buyer.user_id.to_string());

  let joined_ids = order_ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
  let splits_json = serde_json::to_string(splits).ok();

  let mut truncated = false;
  for (key, value) in [("order_ids", Some(joined_ids)), ("splits", splits_json)] {
    match value {
      Some(value) if value.len() <= METADATA_VALUE_LIMIT => {
        metadata.insert(key.to_string(), value);
      }
      _ => truncated = true,
    }
  }
  if truncated {
    metadata.insert("metadata_truncated".to_string(), "true".to_string());
  }
  metadata
}

pub fn register_checkout_pipeline(registry: &Registry<AppError>, _config: &AppConfig) {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(vec![
    StepDef::required("load_cart"),
    StepDef::required("split_cart_by_seller"),
    StepDef::required("snapshot_addresses"),
    StepDef::required("create_seller_orders"),
    StepDef::required("create_payment_intent"),
    StepDef::required("link_intent_to_orders"),
  ]);

  p.on("load_cart", |ctx: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (store, buyer) = ctx.with(|c| (c.app_state.store.clone(), c.buyer));
      let lines = store.cart_lines(buyer.org_id, buyer.user_id).await?;
      if lines.is_empty() {
        info!("Checkout rejected: cart is empty.");
        return Err(AppError::EmptyCart);
      }
      info!(lines = lines.len(), "Cart loaded.");
      ctx.write().cart_lines = lines;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on("split_cart_by_seller", |ctx: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let groups = ctx.with(|c| split_cart(&c.cart_lines, &c.currency, c.app_state.charges.as_ref()))?;
      let currency = ctx.with(|c| c.currency.clone());

      let mut total_minor = 0i64;
      for group in &groups {
        total_minor += minor_units(group.total, &currency)?;
      }
      if total_minor <= 0 {
        return Err(AppError::Validation("Order total must be greater than zero".to_string()));
      }

      info!(sellers = groups.len(), total_minor, %currency, "Cart split by seller.");
      ctx.write().seller_groups = groups;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on("snapshot_addresses", |ctx: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (store, buyer, shipping_id, billing_id) = ctx.with(|c| {
        (
          c.app_state.store.clone(),
          c.buyer,
          c.request.shipping_address_id,
          c.request.billing_address_id,
        )
      });

      let shipping = load_buyer_address(store.as_ref(), buyer, shipping_id).await?;
      let billing = match billing_id {
        Some(id) if id != shipping_id => load_buyer_address(store.as_ref(), buyer, id).await?,
        _ => shipping.clone(),
      };

      ctx.update(|c| {
        c.shipping_address = Some(shipping);
        c.billing_address = Some(billing);
      });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on("create_seller_orders", |ctx: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (store, groups, draft) = {
        let guard = ctx.read();
        let (Some(shipping_address), Some(billing_address)) =
          (guard.shipping_address.clone(), guard.billing_address.clone())
        else {
          return Err(AppError::Internal("Addresses must be snapshotted before orders are created".to_string()));
        };
        let draft = OrderDraft {
          buyer: guard.buyer,
          currency: guard.currency.clone(),
          shipping_address,
          billing_address,
          buyer_notes: guard.request.buyer_notes.clone(),
        };
        (guard.app_state.store.clone(), guard.seller_groups.clone(), draft)
      };

      let mut created = Vec::with_capacity(groups.len());
      for group in &groups {
        match insert_seller_order(store.as_ref(), &draft, group).await {
          Ok(order_with_items) => created.push(order_with_items),
          Err(e) => {
            if !created.is_empty() {
              let orphaned: Vec<Uuid> = created.iter().map(|(o, _)| o.id).collect();
              warn!(?orphaned, "Order creation failed part way; earlier orders stay pending for expiry.");
            }
            return Err(e);
          }
        }
      }

      for (order, items) in &created {
        info!(
          order_id = %order.id,
          order_number = %order.order_number,
          seller_org_id = %order.seller_org_id,
          items = items.len(),
          total = %order.total,
          "Seller order created."
        );
      }
      ctx.write().orders = created;
      Ok(PipelineControl::Continue)
    })
  });

  p.on("create_payment_intent", |ctx: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (gateway, buyer, currency, orders) = ctx.with(|c| {
        (
          c.app_state.gateway.clone(),
          c.buyer,
          c.currency.clone(),
          c.orders.iter().map(|(o, _)| o.clone()).collect::<Vec<_>>(),
        )
      });

      let mut amount_minor = 0i64;
      let mut splits = BTreeMap::new();
      for order in &orders {
        let minor = minor_units(order.total, &currency)?;
        amount_minor += minor;
        *splits.entry(order.seller_org_id).or_insert(0) += minor;
      }
      let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
      let Some(first_order_id) = order_ids.first().copied() else {
        return Err(AppError::Internal("No orders to charge".to_string()));
      };

      let request = CreateIntentRequest {
        amount_minor,
        currency: currency.clone(),
        metadata: build_intent_metadata(buyer, &order_ids, &splits),
        idempotency_key: format!("checkout_{}", first_order_id),
      };

      match gateway.create_payment_intent(request).await {
        Ok(intent) => {
          info!(intent_id = %intent.id, amount_minor, %currency, "Payment intent created.");
          ctx.write().intent = Some(intent);
          Ok(PipelineControl::Continue)
        }
        Err(e) => {
          error!(error = %e, ?order_ids, "Payment intent creation failed; orders left pending for expiry.");
          Err(AppError::from(e))
        }
      }
    })
  });

  p.on("link_intent_to_orders", |ctx: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (store, intent, currency, orders) = ctx.with(|c| {
        (
          c.app_state.store.clone(),
          c.intent.clone(),
          c.currency.clone(),
          c.orders.iter().map(|(o, _)| o.clone()).collect::<Vec<_>>(),
        )
      });
      let intent = intent.ok_or_else(|| AppError::Internal("Payment intent missing before linking".to_string()))?;

      let links = orders
        .iter()
        .map(|order| {
          Ok(PaymentIntentLink {
            intent_id: intent.id.clone(),
            order_id: order.id,
            seller_org_id: order.seller_org_id,
            amount_minor: minor_units(order.total, &currency)?,
            currency: currency.clone(),
          })
        })
        .collect::<AppResult<Vec<_>>>()?;

      let linked_total = PaymentIntentRecord::from_links(&links).map_or(0, |record| record.splits_total());
      if linked_total != intent.amount_minor {
        error!(intent_id = %intent.id, linked_total, intent_amount = intent.amount_minor, "Order splits do not add up to the intent amount.");
        return Err(AppError::Internal(format!(
          "Splits for intent {} total {} but the intent is for {}",
          intent.id, linked_total, intent.amount_minor
        )));
      }

      store.attach_intent(&intent.id, &links).await?;
      info!(intent_id = %intent.id, orders = links.len(), "Intent linked to orders.");

      ctx.update(|c| {
        for (order, _) in c.orders.iter_mut() {
          order.gateway_intent_id = Some(intent.id.clone());
        }
      });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
  info!("Checkout pipeline registered.");
}

/// Runs checkout for `buyer` and returns what the client needs to pay.
#[instrument(
    name = "checkout::run",
    skip(app_state, request),
    fields(buyer_org_id = %buyer.org_id, buyer_user_id = %buyer.user_id)
)]
pub async fn run_checkout(app_state: &AppState, buyer: BuyerIdentity, request: CheckoutRequest) -> AppResult<CheckoutSummary> {
  let ctx = ContextData::new(CheckoutCtxData::new(app_state.clone(), buyer, request));

  if let PipelineResult::Stopped = app_state.registry.run(ctx.clone()).await? {
    return Err(AppError::Internal("Checkout stopped before completion".to_string()));
  }

  let guard = ctx.read();
  let intent = guard
    .intent
    .as_ref()
    .ok_or_else(|| AppError::Internal("Checkout completed without a payment intent".to_string()))?;
  Ok(CheckoutSummary {
    client_secret: intent.client_secret.clone(),
    order_ids: guard.orders.iter().map(|(o, _)| o.id).collect(),
    payment_intent_id: intent.id.clone(),
    amount: intent.amount_minor,
    currency: intent.currency.clone(),
  })
}
