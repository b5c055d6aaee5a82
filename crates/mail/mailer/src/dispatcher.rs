//! Retrying mail dispatcher.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{MailError, MailResult};
use crate::message::{MessageType, OutgoingMessage};
use crate::metrics::DeliveryMetrics;
use crate::retry::RetryPolicy;
use crate::transport::MailTransport;

/// Result of a successful send sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub success: bool,
    /// Attempt number that succeeded (1-based).
    pub attempts: u32,
}

/// Sends messages through a transport, retrying with backoff and
/// recording every completed sequence in the shared metrics.
#[derive(Clone)]
pub struct MailDispatcher {
    transport: Arc<dyn MailTransport>,
    metrics: Arc<DeliveryMetrics>,
    policy: RetryPolicy,
}

impl MailDispatcher {
    /// Creates a dispatcher with the default retry policy.
    pub fn new(transport: Arc<dyn MailTransport>, metrics: Arc<DeliveryMetrics>) -> Self {
        Self {
            transport,
            metrics,
            policy: RetryPolicy::default(),
        }
    }

    /// Sets the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Gets the shared metrics.
    pub fn metrics(&self) -> &Arc<DeliveryMetrics> {
        &self.metrics
    }

    /// Gets the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delivers `message`, trying up to `max_retries` times.
    ///
    /// Exhaustion is counted, snapshotted and returned as
    /// [`MailError::DeliveryExhausted`].
    pub async fn send(
        &self,
        message: &OutgoingMessage,
        message_type: MessageType,
    ) -> MailResult<DeliveryReport> {
        let max_attempts = self.policy.max_retries;
        let mut last_error: Option<String> = None;

        for attempt in 1..=max_attempts {
            match self.transport.send(message).await {
                Ok(()) => {
                    self.metrics.record_success();
                    tracing::info!(
                        to = %message.to,
                        message_type = %message_type,
                        attempts = attempt,
                        delivery_rate = self.metrics.delivery_rate(),
                        "Email sent"
                    );
                    return Ok(DeliveryReport {
                        success: true,
                        attempts: attempt,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        to = %message.to,
                        message_type = %message_type,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Email attempt failed"
                    );
                    last_error = Some(err.to_string());

                    if attempt < max_attempts {
                        let delay = self.policy.backoff(attempt);
                        tracing::debug!(delay_ms = delay.as_millis() as u64, "Retrying email");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let last_error =
            last_error.unwrap_or_else(|| "no delivery attempts permitted".to_string());
        self.metrics
            .record_failure(message_type.as_str(), &message.to, &last_error);
        tracing::error!(
            to = %message.to,
            message_type = %message_type,
            attempts = max_attempts,
            error = %last_error,
            delivery_rate = self.metrics.delivery_rate(),
            "Email delivery exhausted all retries"
        );

        Err(MailError::DeliveryExhausted {
            message_type,
            recipient: message.to.clone(),
            attempts: max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::MemoryTransport;
    use std::time::Duration;

    fn message() -> OutgoingMessage {
        OutgoingMessage::new("donor@example.com", "Thank you", "<p>Thank you</p>")
    }

    fn dispatcher(transport: Arc<MemoryTransport>, max_retries: u32) -> MailDispatcher {
        MailDispatcher::new(transport, Arc::new(DeliveryMetrics::new()))
            .with_policy(RetryPolicy::immediate(max_retries))
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let transport = Arc::new(MemoryTransport::new());
        let dispatcher = dispatcher(transport.clone(), 3);

        let report = dispatcher
            .send(&message(), MessageType::DonationReceipt)
            .await
            .unwrap();

        assert_eq!(report, DeliveryReport { success: true, attempts: 1 });
        assert_eq!(transport.calls(), 1);
        assert_eq!(dispatcher.metrics().total_sent(), 1);
    }

    #[tokio::test]
    async fn test_success_after_two_failures() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_next(2, TransportError::Timeout);
        let dispatcher = dispatcher(transport.clone(), 3);

        let report = dispatcher
            .send(&message(), MessageType::DonationReceipt)
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(dispatcher.metrics().total_sent(), 1);
        assert_eq!(dispatcher.metrics().total_failed(), 0);
        assert!(dispatcher.metrics().last_failure().is_none());
    }

    #[tokio::test]
    async fn test_exhaustion_records_snapshot() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_always(Some(TransportError::Rejected("550 mailbox unavailable".into())));
        let dispatcher = dispatcher(transport.clone(), 3);

        let err = dispatcher
            .send(&message(), MessageType::RecurringReceipt)
            .await
            .unwrap_err();

        match err {
            MailError::DeliveryExhausted { attempts, recipient, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(recipient, "donor@example.com");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.calls(), 3);
        assert_eq!(dispatcher.metrics().total_sent(), 0);
        assert_eq!(dispatcher.metrics().total_failed(), 1);

        let failure = dispatcher.metrics().last_failure().unwrap();
        assert_eq!(failure.recipient, "donor@example.com");
        assert_eq!(failure.message_type, "recurring_receipt");
        assert!(failure.error.contains("550"));
    }

    #[tokio::test]
    async fn test_zero_retries_never_attempts() {
        let transport = Arc::new(MemoryTransport::new());
        let dispatcher = dispatcher(transport.clone(), 0);

        let err = dispatcher
            .send(&message(), MessageType::PaymentFailed)
            .await
            .unwrap_err();

        assert!(matches!(err, MailError::DeliveryExhausted { attempts: 0, .. }));
        assert_eq!(transport.calls(), 0);
        assert_eq!(dispatcher.metrics().total_failed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_next(2, TransportError::Timeout);
        let policy = RetryPolicy::new()
            .base_delay(Duration::from_millis(1000))
            .max_jitter(Duration::ZERO);
        let dispatcher = MailDispatcher::new(transport.clone(), Arc::new(DeliveryMetrics::new()))
            .with_policy(policy);

        let started = tokio::time::Instant::now();
        let report = dispatcher
            .send(&message(), MessageType::DonationReceipt)
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        // 1000ms after the first failure, 2000ms after the second
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test]
    async fn test_rate_after_mixed_sequences() {
        let transport = Arc::new(MemoryTransport::new());
        let dispatcher = dispatcher(transport.clone(), 2);

        for _ in 0..3 {
            dispatcher.send(&message(), MessageType::DonationReceipt).await.unwrap();
        }
        transport.fail_always(Some(TransportError::Timeout));
        assert!(dispatcher.send(&message(), MessageType::DonationReceipt).await.is_err());

        assert_eq!(dispatcher.metrics().delivery_rate(), 75.0);
    }
}
