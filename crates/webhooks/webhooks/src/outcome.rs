//! What became of an acknowledged event.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a degraded event gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// A processor lookup failed.
    Enrichment,
    /// The storage write failed.
    Persistence,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enrichment => f.write_str("enrichment"),
            Self::Persistence => f.write_str("persistence"),
        }
    }
}

/// Result of the donor notification for a handled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent { attempts: u32 },
    Failed { error: String },
    NotRequired,
}

/// The outcome of one webhook event.
///
/// Every variant is acknowledged to the processor; only signature and
/// payload errors reject a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Side effects completed.
    Handled {
        kind: String,
        notification: NotificationStatus,
    },
    /// The event lacked required data; nothing was written or sent.
    Skipped { kind: String, reason: String },
    /// Enrichment or persistence failed; captured as a dead letter.
    Degraded {
        kind: String,
        stage: FailureStage,
        error: String,
    },
    /// No handler for this event type.
    Ignored { event_type: String },
}

impl WebhookOutcome {
    /// True when an operator should look at this event.
    pub fn needs_attention(&self) -> bool {
        match self {
            Self::Degraded { .. } => true,
            Self::Handled { notification, .. } => {
                matches!(notification, NotificationStatus::Failed { .. })
            }
            Self::Skipped { .. } | Self::Ignored { .. } => false,
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled { .. })
    }
}
