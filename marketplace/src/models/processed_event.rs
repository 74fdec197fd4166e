// marketplace/src/models/processed_event.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, SqlxType)]
#[sqlx(type_name = "event_status_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
  Claimed,
  Applied,
}

/// Idempotency record for one gateway event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ProcessedEvent {
  pub event_id: String,
  pub event_type: String,
  pub status: EventStatus,
  /// Identifies the delivery holding the claim; replaced on takeover.
  pub claim_token: Uuid,
  pub claimed_at: DateTime<Utc>,
  pub applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
  /// This delivery owns the event and must apply it. The token scopes a
  /// later release to this claim only.
  Claimed { token: Uuid },
  /// Another delivery applied or is applying it.
  Duplicate,
}

impl ClaimOutcome {
  pub fn token(&self) -> Option<Uuid> {
    match self {
      ClaimOutcome::Claimed { token } => Some(*token),
      ClaimOutcome::Duplicate => None,
    }
  }
}
