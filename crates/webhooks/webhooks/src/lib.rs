//! # Patron Webhooks
//!
//! Inbound payment-processor webhooks for Patron:
//! - HMAC signature verification before anything else runs
//! - Routing over a closed set of event kinds
//! - Enrichment through the processor API
//! - Donor/donation persistence and donor notifications
//! - Typed outcomes and a dead-letter store for absorbed failures
//!
//! ## Example
//!
//! ```rust,ignore
//! use patron_webhooks::{EventHandlers, WebhookReceiver, WebhookRouter};
//!
//! let handlers = EventHandlers::new(storage, processor, dispatcher, site);
//! let router = WebhookRouter::new(WebhookReceiver::new(secret), handlers);
//!
//! // Every outcome is acknowledged; only signature/payload errors reject.
//! let outcome = router.receive(signature_header, &body).await?;
//! ```

mod dead_letter;
mod error;
mod event;
mod handlers;
mod outcome;
mod processor;
mod receiver;
mod router;
mod signature;
#[cfg(feature = "http-client")]
mod stripe;

pub use dead_letter::{DeadLetter, DeadLetterStore, InMemoryDeadLetterStore};
pub use error::{HandlerError, WebhookError, WebhookResult};
pub use event::{EventData, EventKind, ProcessorEvent};
pub use handlers::EventHandlers;
pub use outcome::{FailureStage, NotificationStatus, WebhookOutcome};
pub use processor::{
    BillingDetails, Charge, Customer, InMemoryProcessor, Invoice, PaymentIntent,
    PaymentProcessor, ProcessorError, Subscription,
};
pub use receiver::WebhookReceiver;
pub use router::WebhookRouter;
pub use signature::{SignatureError, WebhookSigner, constant_time_eq};
#[cfg(feature = "http-client")]
pub use stripe::StripeClient;
