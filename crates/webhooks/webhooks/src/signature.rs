//! HMAC signature generation and verification.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`. The
//! signed content is `"<t>." + raw body`, HMAC-SHA256 keyed with the shared
//! webhook secret. Several `v1` entries appear while the processor rolls a
//! secret; any one matching is enough.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Webhook signer for generating and verifying signatures.
pub struct WebhookSigner {
    secret: String,
}

impl WebhookSigner {
    /// Creates a new signer with the given secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Generates a signature for the given payload and timestamp.
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC can take key of any size");

        // Sign: timestamp.payload
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);

        hex::encode(mac.finalize().into_bytes())
    }

    /// Generates a full signature header value.
    pub fn sign_header(&self, timestamp: i64, payload: &[u8]) -> String {
        let signature = self.sign(timestamp, payload);
        format!("t={},v1={}", timestamp, signature)
    }

    /// Verifies a signature against the payload.
    pub fn verify(&self, signature: &str, timestamp: i64, payload: &[u8]) -> bool {
        let expected = self.sign(timestamp, payload);
        constant_time_eq(&expected, signature)
    }

    /// Parses and verifies a signature header.
    pub fn verify_header(
        &self,
        header: &str,
        payload: &[u8],
        tolerance_secs: i64,
    ) -> Result<(), SignatureError> {
        let parsed = parse_signature_header(header)?;

        // Check timestamp tolerance
        let now = chrono::Utc::now().timestamp();
        if (now - parsed.timestamp).abs() > tolerance_secs {
            return Err(SignatureError::Expired);
        }

        if parsed
            .signatures
            .iter()
            .any(|signature| self.verify(signature, parsed.timestamp, payload))
        {
            Ok(())
        } else {
            Err(SignatureError::Invalid)
        }
    }
}

/// Signature verification errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Invalid signature format.
    #[error("Invalid signature format")]
    InvalidFormat,
    /// Signature is invalid.
    #[error("Invalid signature")]
    Invalid,
    /// Signature has expired.
    #[error("Signature expired")]
    Expired,
}

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

/// Parses a signature header into its components. Unknown schemes are skipped.
fn parse_signature_header(header: &str) -> Result<ParsedHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part
            .trim()
            .split_once('=')
            .ok_or(SignatureError::InvalidFormat)?;
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::InvalidFormat)?)
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::InvalidFormat)?;
    if signatures.is_empty() {
        return Err(SignatureError::InvalidFormat);
    }

    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}

/// Constant-time string comparison to prevent timing attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
