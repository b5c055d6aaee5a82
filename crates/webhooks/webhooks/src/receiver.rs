//! Webhook receiver for verifying incoming webhooks.

use crate::error::{WebhookError, WebhookResult};
use crate::event::ProcessorEvent;
use crate::signature::{SignatureError, WebhookSigner};

/// Webhook receiver for verifying incoming webhooks.
pub struct WebhookReceiver {
    signer: WebhookSigner,
    /// Tolerance for timestamp validation (in seconds).
    tolerance_secs: i64,
}

impl WebhookReceiver {
    /// Creates a new webhook receiver.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            signer: WebhookSigner::new(secret),
            tolerance_secs: 300, // 5 minutes
        }
    }

    /// Sets the timestamp tolerance.
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verifies a webhook signature and parses the event.
    ///
    /// Nothing in the body is trusted until the signature checks out.
    pub fn verify(&self, signature: Option<&str>, payload: &[u8]) -> WebhookResult<ProcessorEvent> {
        self.verify_signature(signature, payload)?;

        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }

    /// Verifies only the signature without parsing.
    pub fn verify_signature(&self, signature: Option<&str>, payload: &[u8]) -> WebhookResult<()> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        self.signer
            .verify_header(signature, payload, self.tolerance_secs)
            .map_err(|e| match e {
                SignatureError::InvalidFormat | SignatureError::Invalid => {
                    WebhookError::InvalidSignature
                }
                SignatureError::Expired => WebhookError::ExpiredSignature,
            })
    }
}
