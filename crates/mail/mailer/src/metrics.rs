//! Delivery metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// The most recent exhausted send sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSnapshot {
    pub message_type: String,
    pub recipient: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of [`DeliveryMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_sent: u64,
    pub total_failed: u64,
    /// Percentage of completed sequences that succeeded.
    pub delivery_rate: f64,
    pub last_failure: Option<FailureSnapshot>,
}

/// Counters for completed send sequences.
///
/// One instance is shared by every dispatcher in the process and zeroed
/// only by constructing a new one.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    sent: AtomicU64,
    failed: AtomicU64,
    last_failure: Mutex<Option<FailureSnapshot>>,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.sent.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_failure(&self, message_type: &str, recipient: &str, error: &str) {
        let snapshot = FailureSnapshot {
            message_type: message_type.to_string(),
            recipient: recipient.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        };
        *self
            .last_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot);
        self.failed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn total_sent(&self) -> u64 {
        self.sent.load(Ordering::Acquire)
    }

    pub fn total_failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    /// `100 * sent / (sent + failed)`, or `100` before any sequence completes.
    pub fn delivery_rate(&self) -> f64 {
        rate(self.total_sent(), self.total_failed())
    }

    pub fn last_failure(&self) -> Option<FailureSnapshot> {
        self.last_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_sent = self.total_sent();
        let total_failed = self.total_failed();
        MetricsSnapshot {
            total_sent,
            total_failed,
            delivery_rate: rate(total_sent, total_failed),
            last_failure: self.last_failure(),
        }
    }
}

fn rate(sent: u64, failed: u64) -> f64 {
    let completed = sent + failed;
    if completed == 0 {
        100.0
    } else {
        sent as f64 * 100.0 / completed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_initial_state() {
        let metrics = DeliveryMetrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.total_sent, 0);
        assert_eq!(snapshot.total_failed, 0);
        assert_eq!(snapshot.delivery_rate, 100.0);
        assert!(snapshot.last_failure.is_none());
    }

    #[test]
    fn test_rate_tracks_counters() {
        let metrics = DeliveryMetrics::new();
        for _ in 0..3 {
            metrics.record_success();
        }
        metrics.record_failure("donation_receipt", "d@example.com", "timeout");

        assert_eq!(metrics.delivery_rate(), 75.0);
        let failure = metrics.last_failure().unwrap();
        assert_eq!(failure.recipient, "d@example.com");
        assert_eq!(failure.message_type, "donation_receipt");
    }

    #[test]
    fn test_last_failure_is_replaced() {
        let metrics = DeliveryMetrics::new();
        metrics.record_failure("payment_failed", "a@example.com", "first");
        metrics.record_failure("payment_failed", "b@example.com", "second");

        let failure = metrics.last_failure().unwrap();
        assert_eq!(failure.recipient, "b@example.com");
        assert_eq!(failure.error, "second");
        assert_eq!(metrics.total_failed(), 2);
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(DeliveryMetrics::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            metrics.record_success();
                        } else {
                            metrics.record_failure("other", "x@example.com", "boom");
                        }
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(metrics.total_sent(), 400);
        assert_eq!(metrics.total_failed(), 400);
        assert_eq!(metrics.delivery_rate(), 50.0);
    }
}
