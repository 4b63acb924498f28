//! Application workflows.
//!
//! Each workflow validates with the domain aggregates, commits through the
//! store, then publishes events and sends email. Anything after the commit is
//! best effort: a failure is logged and never undoes or fails the write.

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod refunds;
pub mod reports;
pub mod reviews;
pub mod wishlist;

use crate::domain::events::DomainEvent;
use crate::notify::EmailMessage;
use crate::AppState;

pub(crate) fn email(state: &AppState, to: &str, subject: impl Into<String>, body: impl Into<String>) -> EmailMessage {
    EmailMessage {
        from: state.config.mail_from.clone(),
        to: to.to_string(),
        subject: subject.into(),
        body: body.into(),
        attachments: Vec::new(),
    }
}

pub(crate) async fn send_email(state: &AppState, message: EmailMessage) {
    let to = message.to.clone();
    if let Err(e) = state.notifier.send_email(message).await {
        tracing::warn!(to = %to, error = %e, "email delivery failed");
    }
}

pub(crate) async fn publish(state: &AppState, event: DomainEvent) {
    if let Err(e) = state.notifier.publish(&event).await {
        tracing::warn!(event = event.kind(), error = %e, "event publish failed");
    }
}
