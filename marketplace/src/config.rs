// marketplace/src/config.rs

use crate::errors::{AppError, Result};
use crate::models::money::normalize_currency;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
  Postgres,
  /// In-process store; state is lost on restart.
  Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Text,
  Json,
}

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,

  pub store_backend: StoreBackend,
  pub database_url: Option<String>,
  pub database_max_connections: u32,
  pub run_migrations: bool,

  pub webhook_secret: String,
  pub webhook_signature_header: String,
  pub webhook_tolerance: Duration,
  pub webhook_claim_ttl: Duration,

  pub default_currency: String,
  pub flat_shipping_per_seller: Decimal,
  pub flat_tax_rate: Decimal,

  pub best_effort_timeout: Duration,
  pub email_sender: String,
  pub gateway_account_id: String,
  pub log_format: LogFormat,
}

// Secrets stay out of logs.
impl fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("store_backend", &self.store_backend)
      .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
      .field("database_max_connections", &self.database_max_connections)
      .field("run_migrations", &self.run_migrations)
      .field("webhook_secret", &"[REDACTED]")
      .field("webhook_signature_header", &self.webhook_signature_header)
      .field("webhook_tolerance", &self.webhook_tolerance)
      .field("webhook_claim_ttl", &self.webhook_claim_ttl)
      .field("default_currency", &self.default_currency)
      .field("flat_shipping_per_seller", &self.flat_shipping_per_seller)
      .field("flat_tax_rate", &self.flat_tax_rate)
      .field("best_effort_timeout", &self.best_effort_timeout)
      .field("email_sender", &self.email_sender)
      .field("gateway_account_id", &self.gateway_account_id)
      .field("log_format", &self.log_format)
      .finish()
  }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: fmt::Display,
{
  match lookup(name) {
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
    None => Ok(default),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Builds the configuration from any variable source.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let required = |name: &str| {
      lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Config(format!("Missing environment variable '{}'", name)))
    };

    let store_backend = match lookup("STORE_BACKEND").as_deref().map(str::trim) {
      None | Some("postgres") => StoreBackend::Postgres,
      Some("memory") => StoreBackend::Memory,
      Some(other) => return Err(AppError::Config(format!("Invalid STORE_BACKEND: {}", other))),
    };
    let database_url = match store_backend {
      StoreBackend::Postgres => Some(required("DATABASE_URL")?),
      StoreBackend::Memory => lookup("DATABASE_URL"),
    };

    let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
      None | Some("text") => LogFormat::Text,
      Some("json") => LogFormat::Json,
      Some(other) => return Err(AppError::Config(format!("Invalid LOG_FORMAT: {}", other))),
    };

    let flat_tax_rate: Decimal = parse_var(&lookup, "FLAT_TAX_RATE", Decimal::ZERO)?;
    if flat_tax_rate.is_sign_negative() {
      return Err(AppError::Config("Invalid FLAT_TAX_RATE: must not be negative".to_string()));
    }
    let flat_shipping_per_seller: Decimal = parse_var(&lookup, "FLAT_SHIPPING_PER_SELLER", Decimal::ZERO)?;
    if flat_shipping_per_seller.is_sign_negative() {
      return Err(AppError::Config(
        "Invalid FLAT_SHIPPING_PER_SELLER: must not be negative".to_string(),
      ));
    }

    let config = Self {
      server_host: lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
      server_port: parse_var(&lookup, "SERVER_PORT", 8080)?,
      store_backend,
      database_url,
      database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
      run_migrations: parse_var(&lookup, "RUN_MIGRATIONS", false)?,
      webhook_secret: required("WEBHOOK_SECRET")?,
      webhook_signature_header: lookup("WEBHOOK_SIGNATURE_HEADER")
        .unwrap_or_else(|| "stripe-signature".to_string())
        .to_ascii_lowercase(),
      webhook_tolerance: Duration::from_secs(parse_var(&lookup, "WEBHOOK_TOLERANCE_SECS", 300)?),
      webhook_claim_ttl: Duration::from_secs(parse_var(&lookup, "WEBHOOK_CLAIM_TTL_SECS", 300)?),
      default_currency: normalize_currency(&lookup("DEFAULT_CURRENCY").unwrap_or_else(|| "usd".to_string())),
      flat_shipping_per_seller,
      flat_tax_rate,
      best_effort_timeout: Duration::from_millis(parse_var(&lookup, "BEST_EFFORT_TIMEOUT_MS", 1500)?),
      email_sender: lookup("EMAIL_SENDER").unwrap_or_else(|| "noreply@example.com".to_string()),
      gateway_account_id: lookup("GATEWAY_ACCOUNT_ID").unwrap_or_else(|| "acct_marketplace".to_string()),
      log_format,
    };

    tracing::info!("Application configuration loaded successfully.");
    tracing::debug!(config = ?config, "Loaded config details");
    Ok(config)
  }
}
