//! RSA key pair generation.

use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

use super::{KeyPair, KeyRecord, KeyStatus};

pub const DEFAULT_KEY_SIZE: usize = 4096;
pub const DEFAULT_PUBLIC_EXPONENT: u64 = 65537;
/// Smallest modulus accepted for new keys.
pub const MIN_KEY_SIZE: usize = 2048;

/// Administrative failure while producing a key pair.
///
/// Never used to reject a request; provisioning and rotation surface it to
/// their own callers.
#[derive(Debug, thiserror::Error)]
pub enum KeyGenerationError {
    #[error("Key size {requested} is below the {minimum}-bit minimum")]
    KeySizeTooSmall { requested: usize, minimum: usize },

    #[error("Key generation failed: {message}")]
    KeyGenerationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl KeyGenerationError {
    fn failed<E>(message: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        KeyGenerationError::KeyGenerationFailed {
            message: message.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

/// base64(SHA-256(public_key)).
pub fn fingerprint(public_key: &[u8]) -> String {
    general_purpose::STANDARD.encode(Sha256::digest(public_key))
}

/// Produces RSA key pairs of a fixed size and public exponent.
#[derive(Debug, Clone, Copy)]
pub struct KeyPairGenerator {
    key_size: usize,
    public_exponent: u64,
}

impl KeyPairGenerator {
    /// Create a generator, rejecting moduli below [`MIN_KEY_SIZE`].
    pub fn new(key_size: usize, public_exponent: u64) -> Result<Self, KeyGenerationError> {
        if key_size < MIN_KEY_SIZE {
            return Err(KeyGenerationError::KeySizeTooSmall {
                requested: key_size,
                minimum: MIN_KEY_SIZE,
            });
        }
        Ok(Self {
            key_size,
            public_exponent,
        })
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Generate a new active key pair for `owner_id`.
    ///
    /// CPU-bound; async callers should run it on a blocking thread.
    pub fn generate(&self, owner_id: &str) -> Result<KeyPair, KeyGenerationError> {
        let exponent = BigUint::from(self.public_exponent);
        let private = RsaPrivateKey::new_with_exp(&mut OsRng, self.key_size, &exponent)
            .map_err(|e| KeyGenerationError::failed("RSA key generation", e))?;
        let public = RsaPublicKey::from(&private);

        let private_der = private
            .to_pkcs8_der()
            .map_err(|e| KeyGenerationError::failed("PKCS#8 private key encoding", e))?;
        let public_der = public
            .to_public_key_der()
            .map_err(|e| KeyGenerationError::failed("SPKI public key encoding", e))?;
        let public_key = public_der.as_bytes().to_vec();

        let record = KeyRecord {
            key_id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            fingerprint: fingerprint(&public_key),
            public_key,
            key_size: self.key_size,
            created_at: crate::unix_now(),
            status: KeyStatus::Active,
            previous_key_id: None,
            rotation: None,
            extensions: BTreeMap::new(),
        };

        tracing::debug!(key_id = %record.key_id, key_size = self.key_size, "Generated key pair");

        Ok(KeyPair {
            record,
            private_key: Zeroizing::new(private_der.as_bytes().to_vec()),
        })
    }
}

impl Default for KeyPairGenerator {
    fn default() -> Self {
        Self {
            key_size: DEFAULT_KEY_SIZE,
            public_exponent: DEFAULT_PUBLIC_EXPONENT,
        }
    }
}
