//! Outgoing message types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical label for a kind of notification, used in logs and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    DonationReceipt,
    RecurringReceipt,
    PaymentFailed,
    SubscriptionCancelled,
    /// Anything sent outside the built-in notifications.
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DonationReceipt => "donation_receipt",
            Self::RecurringReceipt => "recurring_receipt",
            Self::PaymentFailed => "payment_failed",
            Self::SubscriptionCancelled => "subscription_cancelled",
            Self::Other(label) => label,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    /// MIME type, e.g. `application/pdf`.
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }
}

/// A fully-formed message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    /// Plain-text alternative. Sent alongside the HTML part when present.
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    /// Creates an HTML message with no attachments.
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            text: None,
            attachments: Vec::new(),
        }
    }

    /// Sets the plain-text alternative.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Adds an attachment.
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}
