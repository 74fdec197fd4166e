// marketplace/src/services/cart_splitter.rs

//! Groups cart lines by seller and prices each group.

use crate::models::money::{normalize_currency, round_to_currency};
use crate::models::CartLine;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
  #[error("cart is empty")]
  EmptyCart,

  #[error("product {product_id} has invalid quantity {quantity}")]
  InvalidQuantity { product_id: Uuid, quantity: i32 },

  #[error("product {product_id} is priced in {found}, checkout currency is {expected}")]
  CurrencyMismatch {
    product_id: Uuid,
    expected: String,
    found: String,
  },
}

/// Shipping and tax for one seller group. Amounts are rounded by the splitter.
pub trait ChargePolicy: Send + Sync {
  fn shipping(&self, seller_org_id: Uuid, subtotal: Decimal, currency: &str) -> Decimal;
  fn tax(&self, seller_org_id: Uuid, subtotal: Decimal, currency: &str) -> Decimal;
}

/// Flat shipping per seller and a flat tax rate on the subtotal.
#[derive(Debug, Clone, Default)]
pub struct FlatCharges {
  pub shipping_per_seller: Decimal,
  pub tax_rate: Decimal,
}

impl ChargePolicy for FlatCharges {
  fn shipping(&self, _seller_org_id: Uuid, _subtotal: Decimal, _currency: &str) -> Decimal {
    self.shipping_per_seller
  }

  fn tax(&self, _seller_org_id: Uuid, subtotal: Decimal, _currency: &str) -> Decimal {
    subtotal * self.tax_rate
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SellerGroup {
  pub seller_org_id: Uuid,
  pub lines: Vec<CartLine>,
  pub subtotal: Decimal,
  pub shipping: Decimal,
  pub tax: Decimal,
  pub discount: Decimal,
  /// subtotal + shipping + tax - discount, each part already rounded.
  pub total: Decimal,
}

/// Splits `lines` into one group per seller, ordered by seller id.
///
/// Lines without a seller are logged and left out of every total.
pub fn split_cart(lines: &[CartLine], currency: &str, charges: &dyn ChargePolicy) -> Result<Vec<SellerGroup>, SplitError> {
  if lines.is_empty() {
    return Err(SplitError::EmptyCart);
  }
  let currency = normalize_currency(currency);

  let mut by_seller: BTreeMap<Uuid, Vec<CartLine>> = BTreeMap::new();
  for line in lines {
    if line.quantity <= 0 {
      return Err(SplitError::InvalidQuantity {
        product_id: line.product_id,
        quantity: line.quantity,
      });
    }
    let line_currency = normalize_currency(&line.currency);
    if line_currency != currency {
      return Err(SplitError::CurrencyMismatch {
        product_id: line.product_id,
        expected: currency,
        found: line_currency,
      });
    }
    match line.seller_org_id {
      Some(seller) => by_seller.entry(seller).or_default().push(line.clone()),
      None => warn!(
        product_id = %line.product_id,
        cart_item_id = %line.cart_item_id,
        "Cart line has no seller reference; excluded from checkout."
      ),
    }
  }

  if by_seller.is_empty() {
    return Err(SplitError::EmptyCart);
  }

  Ok(
    by_seller
      .into_iter()
      .map(|(seller_org_id, lines)| {
        let raw_subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
        let subtotal = round_to_currency(raw_subtotal, &currency);
        let shipping = round_to_currency(charges.shipping(seller_org_id, subtotal, &currency), &currency);
        let tax = round_to_currency(charges.tax(seller_org_id, subtotal, &currency), &currency);
        let discount = Decimal::ZERO;
        SellerGroup {
          seller_org_id,
          lines,
          subtotal,
          shipping,
          tax,
          discount,
          total: subtotal + shipping + tax - discount,
        }
      })
      .collect(),
  )
}
