//! Verifies inbound webhooks and routes them to exactly one handler.

use std::sync::Arc;
use tracing::Instrument;

use crate::dead_letter::{DeadLetter, DeadLetterStore};
use crate::error::{HandlerError, WebhookResult};
use crate::event::ProcessorEvent;
use crate::handlers::EventHandlers;
use crate::outcome::{FailureStage, WebhookOutcome};
use crate::receiver::WebhookReceiver;

/// Entry point for processor webhooks.
pub struct WebhookRouter {
    receiver: WebhookReceiver,
    handlers: EventHandlers,
    dead_letters: Option<Arc<dyn DeadLetterStore>>,
}

impl WebhookRouter {
    pub fn new(receiver: WebhookReceiver, handlers: EventHandlers) -> Self {
        Self {
            receiver,
            handlers,
            dead_letters: None,
        }
    }

    /// Captures degraded events in `store`.
    pub fn with_dead_letters(mut self, store: Arc<dyn DeadLetterStore>) -> Self {
        self.dead_letters = Some(store);
        self
    }

    pub fn handlers(&self) -> &EventHandlers {
        &self.handlers
    }

    /// Verifies the signature, decodes the event and dispatches it.
    ///
    /// Only signature and payload errors are returned; everything past
    /// verification becomes an acknowledged [`WebhookOutcome`].
    pub async fn receive(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> WebhookResult<WebhookOutcome> {
        let event = self.receiver.verify(signature, body).inspect_err(|err| {
            tracing::warn!(error = %err, "Rejected webhook");
        })?;

        Ok(self.dispatch(&event).await)
    }

    /// Runs the handler for an already verified event.
    pub async fn dispatch(&self, event: &ProcessorEvent) -> WebhookOutcome {
        let span = tracing::info_span!(
            "webhook",
            event_id = %event.id,
            event_type = %event.event_type
        );

        async {
            let kind = event.kind();
            if !kind.is_known() {
                tracing::info!("Ignoring unhandled event type");
                return WebhookOutcome::Ignored {
                    event_type: event.event_type.clone(),
                };
            }

            let outcome = match self.handlers.handle(event).await {
                Ok(outcome) => outcome,
                Err(HandlerError::Validation(reason)) => {
                    tracing::warn!(reason = %reason, "Skipping event");
                    WebhookOutcome::Skipped {
                        kind: kind.to_string(),
                        reason,
                    }
                }
                Err(err @ HandlerError::Enrichment(_)) => {
                    self.degrade(event, FailureStage::Enrichment, err).await
                }
                Err(err @ (HandlerError::Persistence(_) | HandlerError::DonationNotRecorded(_))) => {
                    self.degrade(event, FailureStage::Persistence, err).await
                }
            };

            if outcome.needs_attention() {
                tracing::warn!(outcome = ?outcome, "Webhook processed with failures");
            } else {
                tracing::info!(outcome = ?outcome, "Webhook processed");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn degrade(
        &self,
        event: &ProcessorEvent,
        stage: FailureStage,
        err: HandlerError,
    ) -> WebhookOutcome {
        let error = err.to_string();
        let donor_updated = err.donor_updated();
        tracing::error!(stage = %stage, error = %error, donor_updated, "Event side effects lost");

        if let Some(store) = &self.dead_letters {
            let letter = DeadLetter::new(event, stage, &error).with_donor_updated(donor_updated);
            match store.store(letter).await {
                Ok(id) => tracing::info!(dead_letter_id = %id, "Captured dead letter"),
                Err(store_err) => {
                    tracing::error!(error = %store_err, "Failed to capture dead letter")
                }
            }
        }

        WebhookOutcome::Degraded {
            kind: event.kind().to_string(),
            stage,
            error,
        }
    }
}
