// marketplace/src/models/payment.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Durable intent → order mapping. One row per order; the row's amount is
/// that order's total in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PaymentIntentLink {
  pub intent_id: String,
  pub order_id: Uuid,
  pub seller_org_id: Uuid,
  pub amount_minor: i64,
  pub currency: String,
}

/// The logical view of a payment intent, assembled from its links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntentRecord {
  pub intent_id: String,
  pub amount_minor: i64,
  pub currency: String,
  pub order_ids: Vec<Uuid>,
  pub splits: BTreeMap<Uuid, i64>,
}

impl PaymentIntentRecord {
  /// Builds the record from links; `None` when there are no links.
  pub fn from_links(links: &[PaymentIntentLink]) -> Option<Self> {
    let first = links.first()?;
    let mut splits = BTreeMap::new();
    for link in links {
      *splits.entry(link.seller_org_id).or_insert(0) += link.amount_minor;
    }
    Some(Self {
      intent_id: first.intent_id.clone(),
      amount_minor: links.iter().map(|l| l.amount_minor).sum(),
      currency: first.currency.clone(),
      order_ids: links.iter().map(|l| l.order_id).collect(),
      splits,
    })
  }

  pub fn splits_total(&self) -> i64 {
    self.splits.values().sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_sums_splits_per_seller() {
    let seller_a = Uuid::new_v4();
    let seller_b = Uuid::new_v4();
    let link = |seller, amount| PaymentIntentLink {
      intent_id: "pi_1".into(),
      order_id: Uuid::new_v4(),
      seller_org_id: seller,
      amount_minor: amount,
      currency: "usd".into(),
    };
    let record = PaymentIntentRecord::from_links(&[link(seller_a, 700), link(seller_b, 250)]).unwrap();

    assert_eq!(record.amount_minor, 950);
    assert_eq!(record.splits_total(), record.amount_minor);
    assert_eq!(record.splits[&seller_a], 700);
    assert_eq!(record.order_ids.len(), 2);
    assert!(PaymentIntentRecord::from_links(&[]).is_none());
  }
}
