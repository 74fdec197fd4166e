// marketplace/src/web/extractors.rs

//! Request identity. Authentication happens upstream; the gateway in front
//! of this service forwards the authenticated buyer as two headers.

use crate::errors::AppError;
use crate::models::BuyerIdentity;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

pub const BUYER_ORG_HEADER: &str = "X-Buyer-Org-Id";
pub const BUYER_USER_HEADER: &str = "X-Buyer-User-Id";

fn header_uuid(req: &HttpRequest, name: &str) -> Option<Uuid> {
  req
    .headers()
    .get(name)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

impl FromRequest for BuyerIdentity {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    match (header_uuid(req, BUYER_ORG_HEADER), header_uuid(req, BUYER_USER_HEADER)) {
      (Some(org_id), Some(user_id)) => ready(Ok(BuyerIdentity { org_id, user_id })),
      _ => {
        warn!("Missing or invalid buyer identity headers.");
        ready(Err(AppError::Auth(format!(
          "Buyer identity required: set {} and {}",
          BUYER_ORG_HEADER, BUYER_USER_HEADER
        ))))
      }
    }
  }
}
