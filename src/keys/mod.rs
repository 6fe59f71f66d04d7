//! API key pairs: generation, fingerprinting and rotation.
//!
//! A [`KeyPair`] is the private half plus a [`KeyRecord`] carrying every
//! public fact about the key. Only the record is ever persisted; the private
//! key is handed to the owner once and then dropped (and zeroized).

pub mod generator;
pub mod rotation;

pub use generator::{
    fingerprint, KeyGenerationError, KeyPairGenerator, DEFAULT_KEY_SIZE, DEFAULT_PUBLIC_EXPONENT,
    MIN_KEY_SIZE,
};
pub use rotation::{KeyRotator, DEFAULT_ROTATION_REASON};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

use crate::models::{base64_bytes, PublicKeyRecord};

/// Lifecycle state of a key. Moves only from `Active` to `Retired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Retired,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Retired => "retired",
        }
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for KeyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(KeyStatus::Active),
            "retired" => Ok(KeyStatus::Retired),
            _ => Err(format!("Invalid key status: {}", s)),
        }
    }
}

/// Audit facts attached to a key produced by rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationInfo {
    pub rotated_at: u64,
    pub reason: String,
}

/// Public metadata of a key pair, as stored durably.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_id: String,
    pub owner_id: String,
    /// SubjectPublicKeyInfo DER.
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    pub key_size: usize,
    pub created_at: u64,
    pub status: KeyStatus,
    /// base64(SHA-256(public_key)).
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RotationInfo>,
    /// Forward-compatible extra data. Never used for security decisions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl KeyRecord {
    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }

    /// Mark the key retired. Retiring twice is a no-op; there is no way back.
    pub fn retire(&mut self) {
        self.status = KeyStatus::Retired;
    }

    /// Whether `fingerprint` still matches `public_key`.
    pub fn fingerprint_matches(&self) -> bool {
        fingerprint(&self.public_key) == self.fingerprint
    }

    /// The subset the authentication path needs.
    pub fn public_record(&self) -> PublicKeyRecord {
        PublicKeyRecord {
            key_id: self.key_id.clone(),
            owner_id: self.owner_id.clone(),
            public_key: self.public_key.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// A freshly generated key pair.
pub struct KeyPair {
    pub record: KeyRecord,
    /// PKCS#8 DER, zeroized on drop.
    pub private_key: Zeroizing<Vec<u8>>,
}

impl KeyPair {
    pub fn key_id(&self) -> &str {
        &self.record.key_id
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("record", &self.record)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}
