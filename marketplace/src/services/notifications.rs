// marketplace/src/services/notifications.rs
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

pub const ORDER_PAID: &str = "order.paid";

/// An in-app notification for some users of one organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
  pub event_type: String,
  pub organization_id: Uuid,
  pub payload: JsonValue,
  pub recipients: Vec<Uuid>,
}

/// Hands events to the notification system. Delivery is its concern.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn emit(&self, event: NotificationEvent) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct LogNotifier {
  emitted: Mutex<Vec<NotificationEvent>>,
}

impl LogNotifier {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn emitted(&self) -> Vec<NotificationEvent> {
    self.emitted.lock().clone()
  }
}

#[async_trait]
impl Notifier for LogNotifier {
  async fn emit(&self, event: NotificationEvent) -> anyhow::Result<()> {
    info!(
      event_type = %event.event_type,
      organization_id = %event.organization_id,
      recipients = event.recipients.len(),
      "Notification emitted."
    );
    self.emitted.lock().push(event);
    Ok(())
  }
}
