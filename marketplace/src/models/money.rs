// marketplace/src/models/money.rs

//! Decimal amounts and their gateway minor-unit form.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Currencies the gateway charges in whole units.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &["jpy", "krw", "vnd", "clp", "isk", "ugx", "xaf", "xof"];

pub fn normalize_currency(currency: &str) -> String {
  currency.trim().to_ascii_lowercase()
}

/// Number of decimal places in one major unit of `currency`.
pub fn minor_unit_exponent(currency: &str) -> u32 {
  let normalized = normalize_currency(currency);
  if ZERO_DECIMAL_CURRENCIES.contains(&normalized.as_str()) {
    0
  } else {
    2
  }
}

/// Rounds half away from zero to the currency's minor unit.
pub fn round_to_currency(amount: Decimal, currency: &str) -> Decimal {
  amount.round_dp_with_strategy(minor_unit_exponent(currency), RoundingStrategy::MidpointAwayFromZero)
}

/// `amount` in minor units, rounded first. `None` on overflow.
pub fn to_minor_units(amount: Decimal, currency: &str) -> Option<i64> {
  let exponent = minor_unit_exponent(currency);
  let scaled = round_to_currency(amount, currency) * Decimal::from(10i64.pow(exponent));
  scaled.to_i64()
}

pub fn from_minor_units(minor: i64, currency: &str) -> Decimal {
  Decimal::new(minor, minor_unit_exponent(currency))
}
