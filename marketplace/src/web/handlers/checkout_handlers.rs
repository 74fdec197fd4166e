// marketplace/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::models::{BuyerIdentity, CheckoutRequest};
use crate::pipelines::run_checkout;
use crate::state::AppState;

#[instrument(
    name = "handler::create_payment_intent",
    skip(app_state, buyer, payload),
    fields(buyer_org_id = %buyer.org_id, buyer_user_id = %buyer.user_id)
)]
pub async fn create_payment_intent_handler(
  app_state: web::Data<AppState>,
  buyer: BuyerIdentity,
  payload: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, AppError> {
  let summary = run_checkout(app_state.get_ref(), buyer, payload.into_inner()).await?;

  info!(
    payment_intent_id = %summary.payment_intent_id,
    orders = summary.order_ids.len(),
    amount = summary.amount,
    currency = %summary.currency,
    "Checkout completed."
  );
  Ok(HttpResponse::Ok().json(summary))
}
