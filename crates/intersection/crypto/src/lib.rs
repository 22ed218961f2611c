//! Reference signing service: an in-memory Ed25519 keyring
//!
//! Keys are generated locally and never leave the keyring. Production
//! deployments plug in their own `SigningService` (HSM, KMS, ...); this
//! implementation backs tests and single-process deployments.

#![deny(unsafe_code)]

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use intersection_types::{signing_key_id, CircleId, SigningError, SigningService};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};
use zeroize::Zeroize;

/// Algorithm identifier recorded on every signature
pub const ED25519: &str = "ed25519";

/// In-memory Ed25519 keyring keyed by key ID
pub struct Ed25519Keyring {
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl Ed25519Keyring {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a fresh key under `key_id`, replacing any existing key.
    ///
    /// Returns the public half.
    pub fn generate(&self, key_id: impl Into<String>) -> Result<VerifyingKey, SigningError> {
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        let signing_key = SigningKey::from_bytes(&secret);
        secret.zeroize();

        self.insert(key_id.into(), signing_key)
    }

    /// Deterministic key from a 32-byte seed
    pub fn insert_from_seed(
        &self,
        key_id: impl Into<String>,
        seed: [u8; 32],
    ) -> Result<VerifyingKey, SigningError> {
        let mut seed = seed;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();

        self.insert(key_id.into(), signing_key)
    }

    /// Generate the conventional `key-<circleID>` key for a circle
    pub fn generate_for_circle(&self, circle_id: &CircleId) -> Result<VerifyingKey, SigningError> {
        self.generate(signing_key_id(circle_id))
    }

    /// Drop a key. Signatures made with it no longer verify.
    pub fn remove(&self, key_id: &str) -> Result<bool, SigningError> {
        let mut keys = self.keys.write().map_err(|_| SigningError::LockPoisoned)?;
        Ok(keys.remove(key_id).is_some())
    }

    pub fn contains(&self, key_id: &str) -> Result<bool, SigningError> {
        let keys = self.keys.read().map_err(|_| SigningError::LockPoisoned)?;
        Ok(keys.contains_key(key_id))
    }

    pub fn verifying_key(&self, key_id: &str) -> Result<VerifyingKey, SigningError> {
        let keys = self.keys.read().map_err(|_| SigningError::LockPoisoned)?;
        keys.get(key_id)
            .map(|k| k.verifying_key())
            .ok_or_else(|| SigningError::KeyNotFound(key_id.to_string()))
    }

    fn insert(
        &self,
        key_id: String,
        signing_key: SigningKey,
    ) -> Result<VerifyingKey, SigningError> {
        let verifying_key = signing_key.verifying_key();
        let mut keys = self.keys.write().map_err(|_| SigningError::LockPoisoned)?;
        keys.insert(key_id.clone(), signing_key);

        info!(key_id = %key_id, "Signing key registered");
        Ok(verifying_key)
    }
}

impl Default for Ed25519Keyring {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningService for Ed25519Keyring {
    fn sign(&self, key_id: &str, payload: &[u8]) -> Result<Vec<u8>, SigningError> {
        let keys = self.keys.read().map_err(|_| SigningError::LockPoisoned)?;
        let signing_key = keys
            .get(key_id)
            .ok_or_else(|| SigningError::KeyNotFound(key_id.to_string()))?;

        let signature = signing_key.sign(payload);
        debug!(key_id = %key_id, payload_len = payload.len(), "Payload signed");
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, key_id: &str, payload: &[u8], signature: &[u8]) -> Result<(), SigningError> {
        let verifying_key = self.verifying_key(key_id)?;
        let signature = Signature::from_slice(signature)
            .map_err(|e| SigningError::MalformedSignature(e.to_string()))?;

        verifying_key
            .verify(payload, &signature)
            .map_err(|_| SigningError::VerificationFailed(key_id.to_string()))
    }

    fn algorithm(&self) -> &str {
        ED25519
    }
}
