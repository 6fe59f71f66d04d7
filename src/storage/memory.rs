//! In-memory implementations of the key store and the cache tier.
//!
//! Used by tests and local development. Both support an "unavailable" switch
//! so callers can exercise outage handling without a real backend; the key
//! store can also fail a single write after its checks have passed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use super::{CacheTier, KeyStore, StorageError, StorageResult};
use crate::keys::{KeyRecord, KeyStatus};
use crate::models::{PublicKeyRecord, StoredUser};

#[derive(Default)]
struct KeyStoreState {
    users: HashMap<String, StoredUser>,
    keys: HashMap<String, KeyRecord>,
}

/// Durable-tier stand-in backed by hash maps.
#[derive(Default)]
pub struct MemoryKeyStore {
    state: RwLock<KeyStoreState>,
    unavailable: AtomicBool,
    fail_next_write: AtomicBool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next write with [`StorageError::Unavailable`] once its
    /// conflict checks have passed, leaving the store unchanged.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory key store offline".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> StorageResult<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory key store write failed".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, KeyStoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, KeyStoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn insert_user_with_key(
        &self,
        user: &StoredUser,
        record: &KeyRecord,
    ) -> StorageResult<()> {
        self.check_available()?;
        let mut state = self.write();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::Conflict(format!("email {}", user.email)));
        }
        if state.keys.contains_key(&record.key_id) {
            return Err(StorageError::Conflict(format!("key {}", record.key_id)));
        }
        self.check_write()?;
        state.users.insert(user.id.clone(), user.clone());
        state.keys.insert(record.key_id.clone(), record.clone());
        Ok(())
    }

    async fn insert_key(&self, record: &KeyRecord) -> StorageResult<()> {
        self.check_available()?;
        let mut state = self.write();
        if state.keys.contains_key(&record.key_id) {
            return Err(StorageError::Conflict(format!("key {}", record.key_id)));
        }
        self.check_write()?;
        state.keys.insert(record.key_id.clone(), record.clone());
        Ok(())
    }

    async fn find_active_public_key(
        &self,
        key_id: &str,
    ) -> StorageResult<Option<PublicKeyRecord>> {
        self.check_available()?;
        Ok(self
            .read()
            .keys
            .get(key_id)
            .filter(|r| r.status == KeyStatus::Active)
            .map(KeyRecord::public_record))
    }

    async fn find_key(&self, key_id: &str) -> StorageResult<Option<KeyRecord>> {
        self.check_available()?;
        Ok(self.read().keys.get(key_id).cloned())
    }

    async fn retire_key(&self, key_id: &str) -> StorageResult<()> {
        self.check_available()?;
        let mut state = self.write();
        let record = state
            .keys
            .get_mut(key_id)
            .ok_or_else(|| StorageError::NotFound(format!("key {}", key_id)))?;
        record.retire();
        Ok(())
    }

    async fn rotate_key(&self, successor: &KeyRecord, predecessor_id: &str) -> StorageResult<()> {
        self.check_available()?;
        let mut state = self.write();
        match state.keys.get(predecessor_id) {
            None => return Err(StorageError::NotFound(format!("key {}", predecessor_id))),
            Some(r) if r.status != KeyStatus::Active => {
                return Err(StorageError::KeyNotActive(predecessor_id.to_string()))
            }
            Some(_) => {}
        }
        if state.keys.contains_key(&successor.key_id) {
            return Err(StorageError::Conflict(format!("key {}", successor.key_id)));
        }
        self.check_write()?;
        if let Some(predecessor) = state.keys.get_mut(predecessor_id) {
            predecessor.retire();
        }
        state.keys.insert(successor.key_id.clone(), successor.clone());
        Ok(())
    }

    async fn list_keys(&self, owner_id: &str) -> StorageResult<Vec<KeyRecord>> {
        self.check_available()?;
        let mut keys: Vec<KeyRecord> = self
            .read()
            .keys
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.previous_key_id.is_some().cmp(&b.previous_key_id.is_some()))
        });
        Ok(keys)
    }
}

/// A cached value and the instant it stops being served.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    /// `None` when the TTL runs past what the clock can represent.
    pub expires_at: Option<Instant>,
}

/// Fast-tier stand-in with per-entry expiry.
///
/// Expiry uses tokio's clock, so paused-time tests can advance past a TTL.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    unavailable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory cache offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheTier for MemoryCache {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check_available()?;
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at.is_none_or(|at| at > Instant::now()) => {
                Ok(Some(entry.value.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> StorageResult<()> {
        self.check_available()?;
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: Instant::now().checked_add(Duration::from_secs(ttl_secs)),
        };
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::fingerprint;
    use std::collections::BTreeMap;

    fn record(key_id: &str, owner_id: &str, created_at: u64) -> KeyRecord {
        let public_key = format!("pk-{}", key_id).into_bytes();
        KeyRecord {
            key_id: key_id.to_string(),
            owner_id: owner_id.to_string(),
            fingerprint: fingerprint(&public_key),
            public_key,
            key_size: 2048,
            created_at,
            status: KeyStatus::Active,
            previous_key_id: None,
            rotation: None,
            extensions: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_active_lookup_filters_retired() {
        let store = MemoryKeyStore::new();
        store.insert_key(&record("k1", "u1", 1)).await.unwrap();

        let found = store.find_active_public_key("k1").await.unwrap().unwrap();
        assert_eq!(found.key_id, "k1");
        assert_eq!(found.owner_id, "u1");

        store.retire_key("k1").await.unwrap();
        assert!(store.find_active_public_key("k1").await.unwrap().is_none());
        // Retired keys stay in the store for audit.
        let kept = store.find_key("k1").await.unwrap().unwrap();
        assert_eq!(kept.status, KeyStatus::Retired);

        assert!(store.find_active_public_key("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_and_email_conflict() {
        let store = MemoryKeyStore::new();
        store.insert_key(&record("k1", "u1", 1)).await.unwrap();
        let err = store.insert_key(&record("k1", "u2", 2)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let user = StoredUser {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            created_at: 1,
        };
        store
            .insert_user_with_key(&user, &record("k2", "u1", 1))
            .await
            .unwrap();
        let dup = StoredUser {
            id: "u2".to_string(),
            ..user
        };
        assert!(matches!(
            store.insert_user_with_key(&dup, &record("k3", "u2", 2)).await,
            Err(StorageError::Conflict(_))
        ));
        // The rejected signup left no key behind.
        assert!(store.find_key("k3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_signup_writes_nothing() {
        let store = MemoryKeyStore::new();
        let user = StoredUser {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            created_at: 1,
        };

        store.fail_next_write();
        assert!(matches!(
            store.insert_user_with_key(&user, &record("k1", "u1", 1)).await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(store.find_key("k1").await.unwrap().is_none());

        // The email is still free.
        store
            .insert_user_with_key(&user, &record("k1", "u1", 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rotate_key() {
        let store = MemoryKeyStore::new();
        store.insert_key(&record("k1", "u1", 1)).await.unwrap();

        store.rotate_key(&record("k2", "u1", 2), "k1").await.unwrap();
        assert_eq!(
            store.find_key("k1").await.unwrap().unwrap().status,
            KeyStatus::Retired
        );
        assert!(store.find_active_public_key("k2").await.unwrap().is_some());

        // A retired predecessor cannot be rotated a second time.
        assert!(matches!(
            store.rotate_key(&record("k3", "u1", 3), "k1").await,
            Err(StorageError::KeyNotActive(_))
        ));
        assert!(store.find_key("k3").await.unwrap().is_none());

        assert!(matches!(
            store.rotate_key(&record("k4", "u1", 4), "missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_predecessor_active() {
        let store = MemoryKeyStore::new();
        store.insert_key(&record("k1", "u1", 1)).await.unwrap();

        store.fail_next_write();
        assert!(store.rotate_key(&record("k2", "u1", 2), "k1").await.is_err());
        assert!(store.find_active_public_key("k1").await.unwrap().is_some());
        assert!(store.find_key("k2").await.unwrap().is_none());

        // Colliding successor id: predecessor untouched.
        store.insert_key(&record("k3", "u1", 3)).await.unwrap();
        assert!(matches!(
            store.rotate_key(&record("k3", "u1", 4), "k1").await,
            Err(StorageError::Conflict(_))
        ));
        assert!(store.find_active_public_key("k1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retire_missing_key() {
        let store = MemoryKeyStore::new();
        assert!(matches!(
            store.retire_key("nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_keys_by_owner() {
        let store = MemoryKeyStore::new();
        store.insert_key(&record("k2", "u1", 20)).await.unwrap();
        store.insert_key(&record("k1", "u1", 10)).await.unwrap();
        store.insert_key(&record("other", "u2", 5)).await.unwrap();

        let keys = store.list_keys("u1").await.unwrap();
        let ids: Vec<&str> = keys.iter().map(|k| k.key_id.as_str()).collect();
        assert_eq!(ids, vec!["k1", "k2"]);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryKeyStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.find_active_public_key("k1").await,
            Err(StorageError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.find_active_public_key("k1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entry_expires() {
        let cache = MemoryCache::new();
        cache.set("a", b"value", 10).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(b"value".to_vec()));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get("a").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_huge_ttl_does_not_overflow() {
        let cache = MemoryCache::new();
        cache.set("a", b"value", u64::MAX).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn test_cache_set_replaces_entry() {
        let cache = MemoryCache::new();
        cache.set("a", b"one", 60).await.unwrap();
        cache.set("a", b"two", 60).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(cache.len(), 1);
    }
}
