//! Signing service boundary
//!
//! The core never holds key material. It asks a pluggable signing service
//! to sign and verify payloads by key ID.

use crate::CircleId;
use thiserror::Error;

/// Prefix of the signing key registered for each circle
pub const SIGNING_KEY_PREFIX: &str = "key-";

/// Key ID convention for a circle's signing key: `key-<circleID>`
pub fn signing_key_id(circle_id: &CircleId) -> String {
    format!("{}{}", SIGNING_KEY_PREFIX, circle_id)
}

/// Errors reported by a signing service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("signing key not found: {0}")]
    KeyNotFound(String),

    #[error("signature verification failed for key {0}")]
    VerificationFailed(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Lock error")]
    LockPoisoned,
}

/// Signs and verifies payloads with keys identified by ID
pub trait SigningService: Send + Sync {
    fn sign(&self, key_id: &str, payload: &[u8]) -> Result<Vec<u8>, SigningError>;

    fn verify(&self, key_id: &str, payload: &[u8], signature: &[u8]) -> Result<(), SigningError>;

    /// Algorithm name recorded alongside every signature
    fn algorithm(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_follows_convention() {
        assert_eq!(signing_key_id(&CircleId::new("abc")), "key-abc");
    }
}
