// marketplace/src/pipelines/mod.rs

//! Checkout and webhook pipelines, plus the settlement and failure
//! pipelines the webhook routes into.

use crate::config::AppConfig;
use crate::errors::AppError;
use stepflow::Registry;

pub mod checkout_pipeline;
pub mod common_steps;
pub mod contexts;
pub mod failure_pipeline;
pub mod settlement_pipeline;
pub mod webhook_pipeline;

pub use checkout_pipeline::run_checkout;
pub use contexts::WebhookOutcome;
pub use webhook_pipeline::process_webhook;

/// Registers the root pipelines. Called once while building `AppState`.
pub fn register_all_pipelines(registry: &Registry<AppError>, config: &AppConfig) {
  tracing::info!("Registering pipelines...");
  checkout_pipeline::register_checkout_pipeline(registry, config);
  webhook_pipeline::register_webhook_pipeline(registry, config);
  tracing::info!("All pipelines registered.");
}
