// marketplace/src/main.rs

use marketplace_checkout::config::{AppConfig, LogFormat, StoreBackend};
use marketplace_checkout::services::email::LogMailer;
use marketplace_checkout::services::gateway::MockGateway;
use marketplace_checkout::services::notifications::LogNotifier;
use marketplace_checkout::state::AppState;
use marketplace_checkout::store::{MemoryStore, PgStore, Store};
use marketplace_checkout::web::configure_app_routes;

use actix_web::{web as actix_data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Text => builder.init(),
    LogFormat::Json => builder.json().init(),
  }
}

async fn build_store(config: &AppConfig) -> io::Result<Arc<dyn Store>> {
  match config.store_backend {
    StoreBackend::Memory => {
      tracing::warn!("Using the in-memory store; all state is lost on restart.");
      Ok(Arc::new(MemoryStore::new()))
    }
    StoreBackend::Postgres => {
      let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| io::Error::other("DATABASE_URL is required for the postgres store"))?;
      let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await
        .map_err(|e| {
          tracing::error!(error = %e, "Failed to connect to the database.");
          io::Error::other(e)
        })?;
      tracing::info!("Connected to the database.");

      if config.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
          tracing::error!(error = %e, "Database migration failed.");
          io::Error::other(e)
        })?;
        tracing::info!("Database migrations applied.");
      }
      Ok(Arc::new(PgStore::new(pool)))
    }
  }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
  // The log format itself is configured, so peek at it before full config load.
  let _ = dotenvy::dotenv();
  let log_format = match std::env::var("LOG_FORMAT").as_deref() {
    Ok("json") => LogFormat::Json,
    _ => LogFormat::Text,
  };
  init_tracing(log_format);

  tracing::info!("Starting checkout server...");

  let config = AppConfig::from_env().map_err(|e| {
    tracing::error!(error = %e, "Failed to load application configuration.");
    io::Error::other(e.to_string())
  })?;

  let store = build_store(&config).await?;
  let gateway = Arc::new(MockGateway::new(config.gateway_account_id.clone()));
  let server_address = format!("{}:{}", config.server_host, config.server_port);

  let app_state = AppState::new(
    config,
    store,
    gateway,
    Arc::new(LogMailer::new()),
    Arc::new(LogNotifier::new()),
  );

  tracing::info!("Binding server to {}...", server_address);
  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
