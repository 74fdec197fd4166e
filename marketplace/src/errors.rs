// marketplace/src/errors.rs

use crate::services::cart_splitter::SplitError;
use crate::services::gateway::GatewayError;
use crate::services::webhook_signature::SignatureError;
use crate::store::StoreError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use stepflow::FlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Cart is empty")]
  EmptyCart,

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Webhook signature verification failed: {0}")]
  SignatureVerification(#[from] SignatureError),

  #[error("Payment Gateway Error: {0}")]
  Gateway(String),

  /// The intent has no linked orders yet; the gateway should redeliver later.
  #[error("No orders linked to payment intent {0}")]
  IntentNotLinked(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Store Error: {0}")]
  Store(StoreError),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<StoreError> for AppError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::IntentNotLinked(intent_id) => AppError::IntentNotLinked(intent_id),
      other => AppError::Store(other),
    }
  }
}

impl From<SplitError> for AppError {
  fn from(err: SplitError) -> Self {
    match err {
      SplitError::EmptyCart => AppError::EmptyCart,
      other => AppError::Validation(other.to_string()),
    }
  }
}

impl From<GatewayError> for AppError {
  fn from(err: GatewayError) -> Self {
    AppError::Gateway(err.to_string())
  }
}

// Handlers returning anyhow::Result keep their AppError when one was wrapped.
impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<AppError>() {
      Ok(app_err) => app_err,
      Err(err) => match err.downcast::<sqlx::Error>() {
        Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
        Err(err) => AppError::Internal(format!("{:#}", err)),
      },
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) | AppError::EmptyCart | AppError::SignatureVerification(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
      AppError::IntentNotLinked(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Config(_)
      | AppError::Sqlx(_)
      | AppError::Store(_)
      | AppError::Workflow { .. }
      | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    tracing::error!(application_error = %self, "Responding with error");
    let status = self.status_code();
    match self {
      AppError::Validation(m) => HttpResponse::build(status).json(json!({"error": m})),
      AppError::EmptyCart => HttpResponse::build(status).json(json!({"error": "Cart is empty"})),
      AppError::Auth(m) => HttpResponse::build(status).json(json!({"error": m})),
      AppError::NotFound(m) => HttpResponse::build(status).json(json!({"error": m})),
      AppError::SignatureVerification(_) => {
        HttpResponse::build(status).json(json!({"error": "Invalid webhook signature"}))
      }
      AppError::Gateway(m) => {
        HttpResponse::build(status).json(json!({"error": "Payment provider error", "detail": m}))
      }
      AppError::IntentNotLinked(intent_id) => HttpResponse::build(status)
        .insert_header(("Retry-After", "30"))
        .json(json!({"error": "Payment intent not linked yet", "payment_intent_id": intent_id})),
      AppError::Config(_) => HttpResponse::build(status).json(json!({"error": "Configuration issue"})),
      AppError::Sqlx(_) | AppError::Store(_) => {
        HttpResponse::build(status).json(json!({"error": "Database operation failed"}))
      }
      AppError::Workflow { source } => {
        tracing::error!(workflow_error_source = ?source, "Workflow error details");
        HttpResponse::build(status).json(json!({"error": "Workflow processing error"}))
      }
      AppError::Internal(_) => HttpResponse::build(status).json(json!({"error": "An internal error occurred"})),
    }
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn maps_statuses() {
    assert_eq!(AppError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(AppError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(
      AppError::SignatureVerification(SignatureError::Mismatch).status_code(),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(AppError::Gateway("down".into()).status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(
      AppError::IntentNotLinked("pi_1".into()).status_code(),
      StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
      AppError::Store(StoreError::Unavailable("x".into())).status_code(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }

  #[test]
  fn store_intent_not_linked_keeps_its_meaning() {
    let err: AppError = StoreError::IntentNotLinked("pi_9".into()).into();
    assert!(matches!(err, AppError::IntentNotLinked(id) if id == "pi_9"));
  }

  #[test]
  fn anyhow_keeps_wrapped_app_error() {
    let wrapped = anyhow::Error::new(AppError::NotFound("order".into()));
    assert!(matches!(AppError::from(wrapped), AppError::NotFound(_)));

    let plain = anyhow::anyhow!("smtp refused");
    assert!(matches!(AppError::from(plain), AppError::Internal(m) if m.contains("smtp refused")));
  }
}
