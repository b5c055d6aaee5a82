//! # Patron Mailer
//!
//! Notification mail for Patron providing:
//! - A pooled, rate-limited SMTP transport
//! - Retry with jittered exponential backoff
//! - Process-wide delivery metrics, injected rather than global
//! - Rendered notification templates
//!
//! ## Example
//!
//! ```rust,ignore
//! use patron_mailer::{DeliveryMetrics, MailDispatcher, SmtpConfig, SmtpTransport};
//!
//! let transport = Arc::new(SmtpTransport::new(SmtpConfig::new("smtp.example.com"))?);
//! let metrics = Arc::new(DeliveryMetrics::new());
//! let dispatcher = MailDispatcher::new(transport, metrics.clone());
//!
//! let report = dispatcher.send(&message, MessageType::DonationReceipt).await?;
//! assert!(report.success);
//! ```

mod dispatcher;
mod error;
mod message;
mod metrics;
mod rate_limiter;
mod retry;
mod templates;
pub mod transport;

pub use dispatcher::{DeliveryReport, MailDispatcher};
pub use error::{MailError, MailResult, TransportError};
pub use message::{Attachment, MessageType, OutgoingMessage};
pub use metrics::{DeliveryMetrics, FailureSnapshot, MetricsSnapshot};
pub use rate_limiter::SendRateLimiter;
pub use retry::RetryPolicy;
pub use templates::{Notification, RenderedEmail, SiteContext};
pub use transport::{LogTransport, MailTransport, MemoryTransport};
#[cfg(feature = "smtp")]
pub use transport::{SmtpConfig, SmtpTransport};
