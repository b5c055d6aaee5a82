use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::MailTransport;
use crate::error::TransportError;
use crate::message::OutgoingMessage;

/// In-memory transport for tests and local development.
///
/// Every call is counted. Scripted failures are consumed first, one per
/// call; once they run out, messages are accepted and recorded.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    calls: AtomicUsize,
    sent: Mutex<Vec<OutgoingMessage>>,
    failures: Mutex<VecDeque<TransportError>>,
    always_fail: Mutex<Option<TransportError>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` calls with `error`.
    pub fn fail_next(&self, count: usize, error: TransportError) {
        let mut failures = lock(&self.failures);
        for _ in 0..count {
            failures.push_back(error.clone());
        }
    }

    /// Fails every call with `error` until cleared with `None`.
    pub fn fail_always(&self, error: Option<TransportError>) {
        *lock(&self.always_fail) = error;
    }

    /// Number of `send` calls, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = lock(&self.always_fail).clone() {
            return Err(error);
        }
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }

        lock(&self.sent).push(message.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let transport = MemoryTransport::new();
        transport.fail_next(1, TransportError::Timeout);
        let message = OutgoingMessage::new("d@example.com", "Hi", "<p>Hi</p>");

        assert_eq!(transport.send(&message).await, Err(TransportError::Timeout));
        assert!(transport.send(&message).await.is_ok());
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.sent(), vec![message]);
    }

    #[tokio::test]
    async fn test_fail_always() {
        let transport = MemoryTransport::new();
        transport.fail_always(Some(TransportError::Connection("refused".into())));
        let message = OutgoingMessage::new("d@example.com", "Hi", "<p>Hi</p>");

        assert!(transport.send(&message).await.is_err());
        transport.fail_always(None);
        assert!(transport.send(&message).await.is_ok());
    }
}
