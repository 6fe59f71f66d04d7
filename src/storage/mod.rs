//! Storage layer for key records, the public-key cache and object storage.
//!
//! Two tiers back key lookups:
//! - the durable tier ([`KeyStore`]) is authoritative (SQLite in production),
//! - the fast tier ([`CacheTier`]) holds short-lived copies (Redis in production).
//!
//! Both are constructed once at startup and injected; nothing here is global.

pub mod cache;
pub mod memory;
pub mod object;
pub mod redis_cache;
pub mod sqlite;

pub use cache::{PublicKeyCache, DEFAULT_KEY_CACHE_TTL_SECS};
pub use memory::{MemoryCache, MemoryKeyStore};
pub use object::{
    ObjectStorage, ObjectStorageError, S3Storage, UploadUrl, MAX_PRESIGNED_URL_TTL_SECS,
};
pub use redis_cache::RedisCache;
pub use sqlite::SqliteKeyStore;

use async_trait::async_trait;

use crate::keys::KeyRecord;
use crate::models::{PublicKeyRecord, StoredUser};

/// Error type for key store and cache operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Key is not active: {0}")]
    KeyNotActive(String),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable, authoritative store for identities and key records.
///
/// Records are never deleted; retirement is a status change.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Store a new identity together with its first key, atomically.
    ///
    /// Fails with [`StorageError::Conflict`] if the email or the key id is
    /// already taken; on any failure neither row is written.
    async fn insert_user_with_key(&self, user: &StoredUser, record: &KeyRecord)
        -> StorageResult<()>;

    /// Store a new key record. Fails with [`StorageError::Conflict`] if the
    /// key id already exists.
    async fn insert_key(&self, record: &KeyRecord) -> StorageResult<()>;

    /// Look up the public key for `key_id`, only if the key is active.
    ///
    /// Missing and retired keys both return `Ok(None)`.
    async fn find_active_public_key(&self, key_id: &str)
        -> StorageResult<Option<PublicKeyRecord>>;

    /// Fetch the full record regardless of status.
    async fn find_key(&self, key_id: &str) -> StorageResult<Option<KeyRecord>>;

    /// Mark a key retired. Idempotent; fails with
    /// [`StorageError::NotFound`] if the key does not exist.
    async fn retire_key(&self, key_id: &str) -> StorageResult<()>;

    /// Store `successor` and retire `predecessor_id` as one unit.
    ///
    /// Only an active predecessor can be rotated: a retired one fails with
    /// [`StorageError::KeyNotActive`], a missing one with
    /// [`StorageError::NotFound`]. Of two concurrent rotations of the same
    /// key exactly one succeeds. On any failure nothing is written.
    async fn rotate_key(&self, successor: &KeyRecord, predecessor_id: &str)
        -> StorageResult<()>;

    /// All keys of an owner, oldest first.
    async fn list_keys(&self, owner_id: &str) -> StorageResult<Vec<KeyRecord>>;
}

/// Fast, expiring key/value tier.
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Write `value` under `key`, replacing any previous entry, expiring
    /// after `ttl_secs`.
    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> StorageResult<()>;
}
