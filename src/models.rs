//! Request and response models for the API.
//!
//! All models use serde for serialization/deserialization.
//! Storage models represent what the cache and key store hold.

use serde::{Deserialize, Serialize};

use crate::keys::{KeyRecord, RotationInfo};

// ============================================================================
// Storage Models
// ============================================================================

/// Public key material needed to verify a caller's signatures.
///
/// This is the value held in the fast tier (JSON, public key as base64).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub key_id: String,
    pub owner_id: String,
    /// SubjectPublicKeyInfo DER.
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    pub fingerprint: String,
}

/// Identity as stored in the durable tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: String,
    pub email: String,
    pub created_at: u64,
}

/// Serde adapter storing `Vec<u8>` as standard base64.
pub mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Identity Models
// ============================================================================

/// Request to provision a new identity.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
}

/// Returned once at provisioning. The private key is never stored server-side.
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user_id: String,
    pub key_id: String,
    pub private_key: String, // base64 PKCS#8 DER
    pub public_key: String,  // base64 SPKI DER
    pub fingerprint: String,
}

/// Returned once after a successful rotation.
#[derive(Debug, Serialize)]
pub struct RotateKeyResponse {
    pub key_id: String,
    pub previous_key_id: String,
    pub private_key: String, // base64 PKCS#8 DER
    pub public_key: String,  // base64 SPKI DER
    pub fingerprint: String,
    pub rotated_at: u64,
}

/// Key info for listing an identity's rotation history.
#[derive(Debug, Serialize)]
pub struct KeyInfo {
    pub key_id: String,
    pub fingerprint: String,
    pub key_size: usize,
    pub status: String,
    pub created_at: u64,
    pub previous_key_id: Option<String>,
    pub rotation: Option<RotationInfo>,
}

impl From<KeyRecord> for KeyInfo {
    fn from(record: KeyRecord) -> Self {
        KeyInfo {
            key_id: record.key_id,
            fingerprint: record.fingerprint,
            key_size: record.key_size,
            status: record.status.as_str().to_string(),
            created_at: record.created_at,
            previous_key_id: record.previous_key_id,
            rotation: record.rotation,
        }
    }
}

// ============================================================================
// Upload Models
// ============================================================================

/// State of an upload when its URL is issued.
///
/// The service keeps no upload record afterwards, so `pending` is the only
/// state it reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
}

/// Request for a pre-signed upload URL.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
}

/// Pre-signed upload target.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub original_filename: String,
    pub path: String,
    pub url: String,
    pub content_type: String,
    pub status: UploadStatus,
    pub expires_in: u64,
    pub user_id: String,
}

/// Request for a pre-signed download URL.
#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub url: String,
    pub expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_record_json() {
        let record = PublicKeyRecord {
            key_id: "k".to_string(),
            owner_id: "o".to_string(),
            public_key: vec![0, 1, 2, 255],
            fingerprint: "fp".to_string(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"public_key\":\"AAEC/w==\""));
        let back: PublicKeyRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_public_key_record_rejects_bad_base64() {
        let json = r#"{"key_id":"k","owner_id":"o","public_key":"!!","fingerprint":"f"}"#;
        assert!(serde_json::from_str::<PublicKeyRecord>(json).is_err());
    }

    #[test]
    fn test_upload_status_lowercase() {
        assert_eq!(
            serde_json::to_string(&UploadStatus::Pending).unwrap(),
            "\"pending\""
        );
    }
}
