//! Outbound email and domain events.
//!
//! With NATS configured, emails are handed to a mail worker on
//! `storefront.email` and events go to `storefront.events.<kind>`.
//! Without it both are logged.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::events::DomainEvent;

pub const EMAIL_SUBJECT: &str = "storefront.email";
pub const EVENT_SUBJECT_PREFIX: &str = "storefront.events";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to publish to {subject}: {reason}")]
    Publish { subject: String, reason: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    /// Base64 encoded content.
    pub data: String,
}

impl Attachment {
    pub fn pdf(filename: impl Into<String>, bytes: &[u8]) -> Self {
        Self { filename: filename.into(), content_type: "application/pdf".into(), data: STANDARD.encode(bytes) }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotifyError>;
    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError>;
}

pub struct NatsNotifier {
    client: async_nats::Client,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }

    async fn send(&self, subject: String, payload: Vec<u8>) -> Result<(), NotifyError> {
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| NotifyError::Publish { subject, reason: e.to_string() })
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(&message)?;
        self.send(EMAIL_SUBJECT.to_string(), payload).await?;
        tracing::info!(to = %message.to, subject = %message.subject, "email queued");
        Ok(())
    }

    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(event)?;
        self.send(format!("{EVENT_SUBJECT_PREFIX}.{}", event.kind()), payload).await
    }
}

/// Used when no message broker is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotifyError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            attachments = message.attachments.len(),
            "email not delivered: no broker configured"
        );
        Ok(())
    }

    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError> {
        tracing::info!(event = event.kind(), payload = %serde_json::to_string(event)?, "domain event");
        Ok(())
    }
}

/// Keeps everything it is given. Handy in tests.
#[derive(Debug, Default)]
pub struct Outbox {
    emails: Mutex<Vec<EmailMessage>>,
    events: Mutex<Vec<DomainEvent>>,
}

impl Outbox {
    pub async fn emails(&self) -> Vec<EmailMessage> { self.emails.lock().await.clone() }
    pub async fn events(&self) -> Vec<DomainEvent> { self.events.lock().await.clone() }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotifyError> {
        self.emails.lock().await.push(message);
        Ok(())
    }

    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_outbox_records() {
        let outbox = Outbox::default();
        let message = EmailMessage {
            from: "shop@example.com".into(), to: "jane@example.com".into(), subject: "Hi".into(), body: "b".into(),
            attachments: vec![Attachment::pdf("a.pdf", b"%PDF")],
        };
        outbox.send_email(message).await.unwrap();
        let event = DomainEvent::RefundRejected { refund_id: Uuid::now_v7(), order_id: Uuid::now_v7() };
        outbox.publish(&event).await.unwrap();
        assert_eq!(outbox.emails().await[0].attachments[0].data, "JVBERg==");
        assert_eq!(outbox.events().await.len(), 1);
        LogNotifier.publish(&DomainEvent::OrderPlaced { order_id: Uuid::nil(), user_id: Uuid::nil(), total: Decimal::ONE }).await.unwrap();
    }
}
