//! Mail transports.
//!
//! - [`SmtpTransport`] - pooled SMTP via lettre
//! - [`MemoryTransport`] - records messages, with scripted failures (testing)
//! - [`LogTransport`] - logs messages instead of sending (development)

mod logging;
mod memory;
#[cfg(feature = "smtp")]
mod smtp;

pub use logging::LogTransport;
pub use memory::MemoryTransport;
#[cfg(feature = "smtp")]
pub use smtp::{SmtpConfig, SmtpTransport};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::message::OutgoingMessage;

/// A single delivery attempt.
///
/// Connection pooling, throttling and per-attempt timeouts belong to the
/// transport; retrying belongs to the dispatcher.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError>;
}
