//! # Patron Server
//!
//! HTTP surface for Patron: the payment webhook endpoint, a health check,
//! the identity-provider sign-in callback and read-only operator
//! endpoints for mail metrics and dead letters.

mod config;
mod routes;

pub use config::{
    CONFIG_PATH_VAR, ConfigError, PatronConfig, ServerConfig, SiteConfig, StripeConfig,
    load_config, parse_config,
};

use axum::Router;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use patron_adapter_memory::MemoryAdapter;
use patron_core::StorageAdapter;
use patron_mailer::{
    DeliveryMetrics, LogTransport, MailDispatcher, MailError, MailTransport, SiteContext,
    SmtpTransport,
};
use patron_oauth::IdentityService;
use patron_webhooks::{
    DeadLetterStore, EventHandlers, InMemoryDeadLetterStore, InMemoryProcessor, PaymentProcessor,
    StripeClient, WebhookReceiver, WebhookRouter,
};

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub webhooks: Arc<WebhookRouter>,
    pub identity: IdentityService,
    pub metrics: Arc<DeliveryMetrics>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
    /// Bearer token required on `/admin` and `/auth` routes when set.
    pub admin_token: Option<String>,
}

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Mail setup failed: {0}")]
    Mail(#[from] MailError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the application router with tracing and panic recovery.
pub fn build_router(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Wires storage, mail, the processor client, sign-in and the webhook
/// router from configuration.
pub fn build_state(config: &PatronConfig) -> Result<AppState, ServerError> {
    let storage: Arc<dyn StorageAdapter> = Arc::new(MemoryAdapter::new());
    let metrics = Arc::new(DeliveryMetrics::new());

    let transport: Arc<dyn MailTransport> = if config.smtp_enabled() {
        Arc::new(SmtpTransport::new(config.smtp.clone())?)
    } else {
        tracing::warn!("SMTP_HOST not set, notifications will be logged instead of sent");
        Arc::new(LogTransport)
    };

    let processor: Arc<dyn PaymentProcessor> = match &config.stripe.secret_key {
        Some(secret_key) => {
            let client = StripeClient::new(secret_key.clone());
            match &config.stripe.api_base {
                Some(base) => Arc::new(client.with_base_url(base.clone())),
                None => Arc::new(client),
            }
        }
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, enrichment lookups will find nothing");
            Arc::new(InMemoryProcessor::new())
        }
    };

    let identity = IdentityService::new(storage.clone());
    let dead_letters: Arc<dyn DeadLetterStore> = Arc::new(InMemoryDeadLetterStore::new());
    let handlers = EventHandlers::new(
        storage,
        processor,
        MailDispatcher::new(transport, metrics.clone()),
        SiteContext::new(config.site.organization.clone(), config.site.url.clone()),
    );
    let webhooks = WebhookRouter::new(
        WebhookReceiver::new(config.stripe.webhook_secret.clone()),
        handlers,
    )
    .with_dead_letters(dead_letters.clone());

    Ok(AppState {
        webhooks: Arc::new(webhooks),
        identity,
        metrics,
        dead_letters,
        admin_token: config.server.admin_token.clone(),
    })
}
