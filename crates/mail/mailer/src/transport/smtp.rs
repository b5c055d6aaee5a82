//! Pooled SMTP transport.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart};
use lettre::transport::smtp::PoolConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::MailTransport;
use crate::error::{MailError, TransportError};
use crate::message::OutgoingMessage;
use crate::rate_limiter::SendRateLimiter;

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address.
const DEFAULT_FROM_ADDRESS: &str = "noreply@localhost";

/// SMTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Implicit TLS (usually port 465). STARTTLS is required otherwise.
    pub secure: bool,
    /// Optional SMTP username.
    pub user: Option<String>,
    /// Optional SMTP password.
    pub password: Option<String>,
    /// RFC 5322 "From" address.
    pub from: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Messages per pooled connection before the pool is recycled; `0` never recycles.
    pub max_messages: u32,
    /// Messages allowed per `rate_delta_ms`; `0` disables the ceiling.
    pub rate_limit: u32,
    /// Length of the rate window in milliseconds.
    pub rate_delta_ms: u64,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SMTP_PORT,
            secure: false,
            user: None,
            password: None,
            from: DEFAULT_FROM_ADDRESS.to_string(),
            pool_size: 5,
            max_messages: 100,
            rate_limit: 10,
            rate_delta_ms: 1000,
            timeout_secs: 30,
        }
    }
}

impl SmtpConfig {
    /// Creates a config for `host` with default settings.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Sets the credentials.
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the sender address.
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Sends after which the whole pool is rebuilt.
    fn recycle_after(&self) -> u64 {
        u64::from(self.pool_size.max(1)) * u64::from(self.max_messages)
    }
}

/// SMTP transport backed by a lettre connection pool.
///
/// The rate ceiling is enforced here: an over-limit send fails fast with
/// [`TransportError::Throttled`] and is left to the dispatcher's backoff.
pub struct SmtpTransport {
    config: SmtpConfig,
    from: Mailbox,
    mailer: RwLock<AsyncSmtpTransport<Tokio1Executor>>,
    sent_on_pool: AtomicU64,
    limiter: SendRateLimiter,
}

impl SmtpTransport {
    /// Creates the transport. No connection is opened until the first send.
    pub fn new(config: SmtpConfig) -> Result<Self, MailError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| MailError::ConfigError(format!("invalid sender address: {e}")))?;
        let mailer = build_mailer(&config)?;
        let limiter = SendRateLimiter::new(
            config.rate_limit,
            Duration::from_millis(config.rate_delta_ms.max(1)),
        );

        tracing::info!(
            host = %config.host,
            port = config.port,
            pool_size = config.pool_size,
            rate_limit = config.rate_limit,
            "SMTP transport configured"
        );

        Ok(Self {
            config,
            from,
            mailer: RwLock::new(mailer),
            sent_on_pool: AtomicU64::new(0),
            limiter,
        })
    }

    /// Counts a send against the pool and rebuilds it once the
    /// per-connection budget is spent.
    async fn note_sent(&self) {
        let threshold = self.config.recycle_after();
        if threshold == 0 {
            return;
        }

        let sent = self.sent_on_pool.fetch_add(1, Ordering::AcqRel) + 1;
        if sent < threshold {
            return;
        }

        match build_mailer(&self.config) {
            Ok(fresh) => {
                *self.mailer.write().await = fresh;
                self.sent_on_pool.store(0, Ordering::Release);
                tracing::debug!(sent, "Recycled SMTP connection pool");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to recycle SMTP connection pool"),
        }
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.limiter
            .try_acquire()
            .await
            .map_err(|retry_after| TransportError::Throttled { retry_after })?;

        let email = build_message(&self.from, message)?;
        let mailer = self.mailer.read().await.clone();
        mailer.send(email).await?;

        self.note_sent().await;
        Ok(())
    }
}

fn build_mailer(config: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
    if config.host.is_empty() {
        return Err(MailError::ConfigError("SMTP host is empty".to_string()));
    }

    let builder = if config.secure {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
    }
    .map_err(|e| MailError::ConfigError(e.to_string()))?;

    let mut builder = builder
        .port(config.port)
        .timeout(Some(Duration::from_secs(config.timeout_secs)))
        .pool_config(PoolConfig::new().max_size(config.pool_size.max(1)));

    if let (Some(user), Some(pass)) = (&config.user, &config.password) {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }

    Ok(builder.build())
}

/// Converts an [`OutgoingMessage`] into a MIME message.
fn build_message(from: &Mailbox, message: &OutgoingMessage) -> Result<Message, TransportError> {
    let builder = Message::builder()
        .from(from.clone())
        .to(message.to.parse::<Mailbox>()?)
        .subject(message.subject.clone());

    let body = match &message.text {
        Some(text) => MultiPart::alternative_plain_html(text.clone(), message.html.clone()),
        None => MultiPart::alternative().singlepart(
            lettre::message::SinglePart::html(message.html.clone()),
        ),
    };

    let email = if message.attachments.is_empty() {
        builder.multipart(body)?
    } else {
        let mut mixed = MultiPart::mixed().multipart(body);
        for attachment in &message.attachments {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                TransportError::InvalidMessage(format!(
                    "bad content type for {}: {e}",
                    attachment.filename
                ))
            })?;
            mixed = mixed.singlepart(
                MimeAttachment::new(attachment.filename.clone())
                    .body(attachment.content.clone(), content_type),
            );
        }
        builder.multipart(mixed)?
    };

    Ok(email)
}
