// marketplace/src/models/user.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Who to email or notify. Identity and permissions live upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserContact {
  pub id: Uuid,
  pub organization_id: Uuid,
  pub email: String,
  pub display_name: String,
}
