// marketplace/src/state.rs
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::pipelines;
use crate::services::cart_splitter::{ChargePolicy, FlatCharges};
use crate::services::email::Mailer;
use crate::services::gateway::PaymentGateway;
use crate::services::notifications::Notifier;
use crate::store::Store;
use std::sync::Arc;
use stepflow::Registry;

/// Everything a request or pipeline step needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn Store>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub mailer: Arc<dyn Mailer>,
  pub notifier: Arc<dyn Notifier>,
  pub charges: Arc<dyn ChargePolicy>,
  pub registry: Arc<Registry<AppError>>,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Wires the collaborators and registers every pipeline.
  pub fn new(
    config: AppConfig,
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn Mailer>,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    let charges = Arc::new(FlatCharges {
      shipping_per_seller: config.flat_shipping_per_seller,
      tax_rate: config.flat_tax_rate,
    });
    let registry = Arc::new(Registry::<AppError>::new());
    pipelines::register_all_pipelines(&registry, &config);

    Self {
      store,
      gateway,
      mailer,
      notifier,
      charges,
      registry,
      config: Arc::new(config),
    }
  }

  pub fn with_charges(mut self, charges: Arc<dyn ChargePolicy>) -> Self {
    self.charges = charges;
    self
  }
}
