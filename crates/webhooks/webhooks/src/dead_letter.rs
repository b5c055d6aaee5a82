//! Dead letters for events whose side effects were lost.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::WebhookResult;
use crate::event::ProcessorEvent;
use crate::outcome::FailureStage;

/// An acknowledged event whose enrichment or persistence failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: String,
    pub event_id: String,
    pub event_type: String,
    pub stage: FailureStage,
    pub error: String,
    /// Set when the donor's totals were already updated, so a replay
    /// would count the amount twice.
    #[serde(default)]
    pub donor_updated: bool,
    /// The event's data object, kept for manual reconciliation.
    pub payload: serde_json::Value,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(event: &ProcessorEvent, stage: FailureStage, error: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            stage,
            error: error.into(),
            donor_updated: false,
            payload: event.data.object.clone(),
            failed_at: Utc::now(),
        }
    }

    pub fn with_donor_updated(mut self, donor_updated: bool) -> Self {
        self.donor_updated = donor_updated;
        self
    }
}

/// Storage for dead letters.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Stores a dead letter, returning its ID.
    async fn store(&self, dead_letter: DeadLetter) -> WebhookResult<String>;

    /// Gets a dead letter by ID.
    async fn get(&self, id: &str) -> WebhookResult<Option<DeadLetter>>;

    /// Lists dead letters, newest first.
    async fn list(&self, limit: usize) -> WebhookResult<Vec<DeadLetter>>;

    /// Removes a dead letter once reconciled.
    async fn delete(&self, id: &str) -> WebhookResult<()>;

    async fn count(&self) -> WebhookResult<usize>;
}

/// Bounded in-memory store; the oldest letter is evicted when full.
#[derive(Clone)]
pub struct InMemoryDeadLetterStore {
    letters: Arc<RwLock<VecDeque<DeadLetter>>>,
    capacity: usize,
}

impl InMemoryDeadLetterStore {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            letters: Arc::new(RwLock::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemoryDeadLetterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn store(&self, dead_letter: DeadLetter) -> WebhookResult<String> {
        let mut letters = self.letters.write().await;
        while letters.len() >= self.capacity {
            if let Some(evicted) = letters.pop_front() {
                tracing::warn!(
                    dead_letter_id = %evicted.id,
                    event_id = %evicted.event_id,
                    "Dead letter store full, evicting oldest entry"
                );
            }
        }
        let id = dead_letter.id.clone();
        letters.push_back(dead_letter);
        Ok(id)
    }

    async fn get(&self, id: &str) -> WebhookResult<Option<DeadLetter>> {
        let letters = self.letters.read().await;
        Ok(letters.iter().find(|l| l.id == id).cloned())
    }

    async fn list(&self, limit: usize) -> WebhookResult<Vec<DeadLetter>> {
        let letters = self.letters.read().await;
        Ok(letters.iter().rev().take(limit).cloned().collect())
    }

    async fn delete(&self, id: &str) -> WebhookResult<()> {
        let mut letters = self.letters.write().await;
        letters.retain(|l| l.id != id);
        Ok(())
    }

    async fn count(&self) -> WebhookResult<usize> {
        Ok(self.letters.read().await.len())
    }
}
