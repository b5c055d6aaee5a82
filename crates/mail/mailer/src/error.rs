//! Mail error types.

use std::time::Duration;

use thiserror::Error;

use crate::message::MessageType;

/// Result type for mail operations.
pub type MailResult<T> = Result<T, MailError>;

/// Error type for a complete send sequence.
#[derive(Debug, Error)]
pub enum MailError {
    /// Every permitted attempt failed.
    #[error("Delivery of {message_type} to {recipient} failed after {attempts} attempt(s): {last_error}")]
    DeliveryExhausted {
        message_type: MessageType,
        recipient: String,
        attempts: u32,
        last_error: String,
    },

    /// The message could not be assembled.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error type for a single transport call.
///
/// Every variant is treated as retryable by the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport's send-rate ceiling was reached.
    #[error("Rate limit reached, retry in {retry_after:?}")]
    Throttled { retry_after: Duration },

    /// The connection could not be established or was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected the message.
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// The attempt timed out.
    #[error("Request timeout")]
    Timeout,

    /// The message could not be converted to the wire format.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

#[cfg(feature = "smtp")]
impl From<lettre::transport::smtp::Error> for TransportError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_transient() || err.is_permanent() {
            TransportError::Rejected(err.to_string())
        } else {
            TransportError::Connection(err.to_string())
        }
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::address::AddressError> for TransportError {
    fn from(err: lettre::address::AddressError) -> Self {
        TransportError::InvalidMessage(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::error::Error> for TransportError {
    fn from(err: lettre::error::Error) -> Self {
        TransportError::InvalidMessage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_display() {
        let err = MailError::DeliveryExhausted {
            message_type: MessageType::DonationReceipt,
            recipient: "d@example.com".to_string(),
            attempts: 3,
            last_error: "Request timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Delivery of donation_receipt to d@example.com failed after 3 attempt(s): Request timeout"
        );
    }

    #[cfg(feature = "smtp")]
    #[test]
    fn test_address_error_conversion() {
        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err: TransportError = addr_err.unwrap_err().into();
        assert!(matches!(err, TransportError::InvalidMessage(_)));
    }
}
