//! Webhook error types.

use thiserror::Error;

use patron_core::PatronError;

use crate::processor::ProcessorError;

/// Result type for webhook operations.
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Errors that reject an inbound webhook request.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No signature header was sent.
    #[error("Missing signature header")]
    MissingSignature,

    /// Invalid signature.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature expired.
    #[error("Signature expired")]
    ExpiredSignature,

    /// Invalid payload.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    /// Returns true for failures of authenticity (signature problems).
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature | Self::InvalidSignature | Self::ExpiredSignature
        )
    }

    /// Returns an HTTP status code appropriate for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingSignature
            | Self::InvalidSignature
            | Self::ExpiredSignature
            | Self::InvalidPayload(_) => 400,
            Self::ConfigError(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        WebhookError::InvalidPayload(err.to_string())
    }
}

/// Failures inside an event handler.
///
/// None of these reject the request; the router turns them into an
/// acknowledged [`WebhookOutcome`](crate::WebhookOutcome).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The event is authentic but lacks something required (email, amount).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A dependent processor lookup failed.
    #[error("Enrichment failed: {0}")]
    Enrichment(#[from] ProcessorError),

    /// The storage backend rejected a write.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] PatronError),

    /// The donor's totals were updated but the donation row was not written.
    #[error("Donation not recorded after donor update: {0}")]
    DonationNotRecorded(PatronError),
}

impl HandlerError {
    /// Whether the donor record already reflects this event.
    pub fn donor_updated(&self) -> bool {
        matches!(self, Self::DonationNotRecorded(_))
    }
}
