// marketplace/src/services/email.rs
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
  pub to: String,
  pub from: String,
  pub subject: String,
  pub html_body: String,
  pub text_body: String,
}

#[derive(Debug, Clone)]
pub struct SentEmailInfo {
  pub message_id: String,
  pub to: String,
  pub subject: String,
}

/// Best-effort email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
  async fn send(&self, message: &EmailMessage) -> anyhow::Result<SentEmailInfo>;
}

/// Logs messages instead of delivering them and keeps them for inspection.
#[derive(Default)]
pub struct LogMailer {
  sent: Mutex<Vec<EmailMessage>>,
}

impl LogMailer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn sent(&self) -> Vec<EmailMessage> {
    self.sent.lock().clone()
  }
}

#[async_trait]
impl Mailer for LogMailer {
  async fn send(&self, message: &EmailMessage) -> anyhow::Result<SentEmailInfo> {
    let body_preview = message.text_body.chars().take(50).collect::<String>();
    let message_id = format!("log_email_{}", uuid::Uuid::new_v4());
    info!(
      to = %message.to,
      from = %message.from,
      subject = %message.subject,
      %body_preview,
      %message_id,
      "Email logged instead of delivered."
    );
    self.sent.lock().push(message.clone());

    Ok(SentEmailInfo {
      message_id,
      to: message.to.clone(),
      subject: message.subject.clone(),
    })
  }
}
