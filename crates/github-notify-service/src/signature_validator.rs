//! Webhook signature verification.
//!
//! GitHub signs each delivery with the webhook secret. Current deliveries
//! carry `X-Hub-Signature-256: sha256=<hex>`; older hooks only send
//! `X-Hub-Signature: sha1=<hex>`. The SHA-256 header wins when both are
//! present.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, instrument};

/// Why a delivery's signature was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Missing webhook signature")]
    Missing,

    #[error("Malformed webhook signature: {message}")]
    Malformed { message: String },

    #[error("Webhook signature does not match")]
    Mismatch,
}

/// Verifies deliveries against the shared webhook secret
pub struct WebhookSignatureValidator {
    secret: String,
}

impl WebhookSignatureValidator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Check the delivery's signature headers against `payload`
    #[instrument(skip_all, fields(sha256 = signature_256.is_some(), sha1 = legacy_signature.is_some()))]
    pub fn verify(
        &self,
        payload: &[u8],
        signature_256: Option<&str>,
        legacy_signature: Option<&str>,
    ) -> Result<(), SignatureError> {
        if let Some(signature) = signature_256 {
            return self.verify_sha256(payload, signature);
        }

        if let Some(signature) = legacy_signature {
            debug!("Falling back to legacy SHA-1 webhook signature");
            return self.verify_sha1(payload, signature);
        }

        Err(SignatureError::Missing)
    }

    fn verify_sha256(&self, payload: &[u8], signature: &str) -> Result<(), SignatureError> {
        let expected = decode(signature, "sha256=")?;

        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()).map_err(|_| {
            SignatureError::Malformed {
                message: "secret cannot be used as HMAC key".to_string(),
            }
        })?;
        mac.update(payload);

        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }

    fn verify_sha1(&self, payload: &[u8], signature: &str) -> Result<(), SignatureError> {
        let expected = decode(signature, "sha1=")?;

        let mut mac = Hmac::<Sha1>::new_from_slice(self.secret.as_bytes()).map_err(|_| {
            SignatureError::Malformed {
                message: "secret cannot be used as HMAC key".to_string(),
            }
        })?;
        mac.update(payload);
        let computed = mac.finalize().into_bytes();

        if computed.as_slice().ct_eq(&expected).into() {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

impl std::fmt::Debug for WebhookSignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSignatureValidator")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

fn decode(signature: &str, prefix: &str) -> Result<Vec<u8>, SignatureError> {
    let hex_part = signature
        .trim()
        .strip_prefix(prefix)
        .ok_or_else(|| SignatureError::Malformed {
            message: format!("expected '{}' prefix", prefix),
        })?;

    hex::decode(hex_part).map_err(|_| SignatureError::Malformed {
        message: "signature is not valid hex".to_string(),
    })
}

#[cfg(test)]
#[path = "signature_validator_tests.rs"]
mod tests;
