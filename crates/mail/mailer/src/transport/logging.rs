use async_trait::async_trait;

use super::MailTransport;
use crate::error::TransportError;
use crate::message::OutgoingMessage;

/// Transport that logs messages instead of sending them.
///
/// Used when no SMTP host is configured.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            attachments = message.attachments.len(),
            "Mail transport not configured, logging message instead of sending"
        );
        tracing::debug!(body = %message.text.as_deref().unwrap_or(&message.html), "Message body");
        Ok(())
    }
}
