// marketplace/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::pipelines::process_webhook;
use crate::state::AppState;

/// Gateway webhook endpoint. The body is taken raw; the signature covers
/// the exact bytes.
#[instrument(name = "handler::payment_webhook", skip_all, fields(payload_bytes = body.len()))]
pub async fn payment_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let signature_header = req
    .headers()
    .get(app_state.config.webhook_signature_header.as_str())
    .and_then(|value| value.to_str().ok())
    .map(String::from);

  let outcome = process_webhook(app_state.get_ref(), body, signature_header).await?;
  info!(?outcome, "Webhook acknowledged.");
  Ok(HttpResponse::Ok().json(json!({ "received": true })))
}
