// marketplace/src/web/routes.rs

use crate::web::handlers::{checkout_handlers, webhook_handlers};
use actix_web::{web, HttpResponse};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg
    .route("/health", web::get().to(health_check_handler))
    .service(web::scope("/checkout").route(
      "/payment-intent",
      web::post().to(checkout_handlers::create_payment_intent_handler),
    ))
    .service(web::scope("/payments").route(
      "/webhook",
      web::post().to(webhook_handlers::payment_webhook_handler),
    ));
}
