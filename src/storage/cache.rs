//! Read-through public key cache in front of the durable key store.
//!
//! Fast-tier key pattern: `pubkey:{key_id}` holding a JSON [`PublicKeyRecord`].
//!
//! A retired key can keep authenticating from the fast tier until its entry
//! expires, so the TTL is the upper bound on how stale an answer may be.

use std::sync::Arc;

use super::{CacheTier, KeyStore, StorageResult};
use crate::models::PublicKeyRecord;

pub const DEFAULT_KEY_CACHE_TTL_SECS: u64 = 36_000;

const KEY_PREFIX: &str = "pubkey:";

fn cache_key(key_id: &str) -> String {
    format!("{}{}", KEY_PREFIX, key_id)
}

pub struct PublicKeyCache {
    fast: Arc<dyn CacheTier>,
    durable: Arc<dyn KeyStore>,
    ttl_secs: u64,
}

impl PublicKeyCache {
    pub fn new(fast: Arc<dyn CacheTier>, durable: Arc<dyn KeyStore>, ttl_secs: u64) -> Self {
        Self {
            fast,
            durable,
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// The durable store behind this cache.
    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.durable
    }

    /// Resolve the active public key for `key_id`.
    ///
    /// Misses are never cached, so a newly provisioned key is visible on the
    /// next lookup. Only durable-tier failures are returned as errors.
    pub async fn get(&self, key_id: &str) -> StorageResult<Option<PublicKeyRecord>> {
        let cache_key = cache_key(key_id);

        match self.fast.get(&cache_key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<PublicKeyRecord>(&bytes) {
                Ok(record) if record.key_id == key_id => {
                    tracing::debug!(key_id = %key_id, "Public key cache hit");
                    return Ok(Some(record));
                }
                Ok(_) => {
                    tracing::warn!(key_id = %key_id, "Cached entry belongs to another key, ignoring");
                }
                Err(e) => {
                    tracing::warn!(key_id = %key_id, error = %e, "Undecodable cache entry, ignoring");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key_id = %key_id, error = %e, "Fast tier read failed, using durable store");
            }
        }

        let Some(record) = self.durable.find_active_public_key(key_id).await? else {
            return Ok(None);
        };

        if crate::keys::fingerprint(&record.public_key) != record.fingerprint {
            tracing::error!(key_id = %key_id, "Stored fingerprint does not match public key");
            return Ok(None);
        }

        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = self.fast.set(&cache_key, &bytes, self.ttl_secs).await {
                    tracing::warn!(key_id = %key_id, error = %e, "Fast tier write failed");
                }
            }
            Err(e) => {
                tracing::warn!(key_id = %key_id, error = %e, "Failed to encode cache entry");
            }
        }

        Ok(Some(record))
    }
}
