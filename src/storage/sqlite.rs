//! SQLite-backed durable key store.
//!
//! Tables:
//! - `users`: one row per provisioned identity
//! - `public_keys`: one row per key, never deleted; retirement flips `status`
//!
//! rusqlite is synchronous, so every call runs on the blocking pool behind a
//! shared connection.

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{KeyStore, StorageError, StorageResult};
use crate::keys::{KeyRecord, KeyStatus, RotationInfo};
use crate::models::{PublicKeyRecord, StoredUser};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    email       TEXT NOT NULL UNIQUE,
    created_at  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS public_keys (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL,
    public_key       BLOB NOT NULL,
    key_size         INTEGER NOT NULL,
    created_at       INTEGER NOT NULL,
    status           TEXT NOT NULL,
    fingerprint      TEXT NOT NULL,
    previous_key_id  TEXT,
    rotated_at       INTEGER,
    rotation_reason  TEXT,
    extensions       TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_public_keys_user_id ON public_keys (user_id);
";

const KEY_COLUMNS: &str = "id, user_id, public_key, key_size, created_at, status, fingerprint, \
                           previous_key_id, rotated_at, rotation_reason, extensions";

#[derive(Clone)]
pub struct SqliteKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyStore {
    /// Open (or create) the database file at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&guard)
        })
        .await?
    }
}

fn map_constraint(err: rusqlite::Error, what: String) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StorageError::Conflict(what),
        _ => StorageError::Database(err),
    }
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, err.into())
}

fn key_from_row(row: &Row<'_>) -> rusqlite::Result<KeyRecord> {
    let key_size: i64 = row.get(3)?;
    let created_at: i64 = row.get(4)?;
    let status: String = row.get(5)?;
    let rotated_at: Option<i64> = row.get(8)?;
    let rotation_reason: Option<String> = row.get(9)?;
    let extensions: String = row.get(10)?;

    let status = status
        .parse::<KeyStatus>()
        .map_err(|e| conversion_error(5, Type::Text, e))?;
    let extensions: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&extensions).map_err(|e| conversion_error(10, Type::Text, e))?;
    let rotation = match (rotated_at, rotation_reason) {
        (Some(at), Some(reason)) => Some(RotationInfo {
            rotated_at: at as u64,
            reason,
        }),
        _ => None,
    };

    Ok(KeyRecord {
        key_id: row.get(0)?,
        owner_id: row.get(1)?,
        public_key: row.get(2)?,
        key_size: key_size as usize,
        created_at: created_at as u64,
        status,
        fingerprint: row.get(6)?,
        previous_key_id: row.get(7)?,
        rotation,
        extensions,
    })
}

fn insert_user_row(conn: &Connection, user: &StoredUser) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
        params![user.id, user.email, user.created_at as i64],
    )
    .map_err(|e| map_constraint(e, format!("email {}", user.email)))?;
    Ok(())
}

fn insert_key_row(conn: &Connection, record: &KeyRecord) -> StorageResult<()> {
    let extensions = serde_json::to_string(&record.extensions)?;
    let (rotated_at, rotation_reason) = match &record.rotation {
        Some(r) => (Some(r.rotated_at as i64), Some(r.reason.as_str())),
        None => (None, None),
    };
    conn.execute(
        &format!(
            "INSERT INTO public_keys ({}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            KEY_COLUMNS
        ),
        params![
            record.key_id,
            record.owner_id,
            record.public_key,
            record.key_size as i64,
            record.created_at as i64,
            record.status.as_str(),
            record.fingerprint,
            record.previous_key_id,
            rotated_at,
            rotation_reason,
            extensions,
        ],
    )
    .map_err(|e| map_constraint(e, format!("key {}", record.key_id)))?;
    Ok(())
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    async fn insert_user_with_key(
        &self,
        user: &StoredUser,
        record: &KeyRecord,
    ) -> StorageResult<()> {
        let user = user.clone();
        let record = record.clone();
        self.with_conn(move |conn| {
            // Dropped without commit on any error, which rolls both rows back.
            let tx = conn.unchecked_transaction()?;
            insert_user_row(&tx, &user)?;
            insert_key_row(&tx, &record)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn insert_key(&self, record: &KeyRecord) -> StorageResult<()> {
        let record = record.clone();
        self.with_conn(move |conn| insert_key_row(conn, &record)).await
    }

    async fn find_active_public_key(
        &self,
        key_id: &str,
    ) -> StorageResult<Option<PublicKeyRecord>> {
        let key_id = key_id.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT id, user_id, public_key, fingerprint FROM public_keys \
                     WHERE id = ?1 AND status = 'active'",
                    params![key_id],
                    |row| {
                        Ok(PublicKeyRecord {
                            key_id: row.get(0)?,
                            owner_id: row.get(1)?,
                            public_key: row.get(2)?,
                            fingerprint: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(found)
        })
        .await
    }

    async fn find_key(&self, key_id: &str) -> StorageResult<Option<KeyRecord>> {
        let key_id = key_id.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {} FROM public_keys WHERE id = ?1", KEY_COLUMNS),
                    params![key_id],
                    key_from_row,
                )
                .optional()?;
            Ok(found)
        })
        .await
    }

    async fn retire_key(&self, key_id: &str) -> StorageResult<()> {
        let key_id = key_id.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE public_keys SET status = ?1 WHERE id = ?2",
                params![KeyStatus::Retired.as_str(), key_id],
            )?;
            if changed == 0 {
                return Err(StorageError::NotFound(format!("key {}", key_id)));
            }
            Ok(())
        })
        .await
    }

    async fn rotate_key(&self, successor: &KeyRecord, predecessor_id: &str) -> StorageResult<()> {
        let successor = successor.clone();
        let predecessor_id = predecessor_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let changed = tx.execute(
                "UPDATE public_keys SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![
                    KeyStatus::Retired.as_str(),
                    predecessor_id,
                    KeyStatus::Active.as_str()
                ],
            )?;
            if changed == 0 {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS (SELECT 1 FROM public_keys WHERE id = ?1)",
                    params![predecessor_id],
                    |row| row.get(0),
                )?;
                return Err(if exists {
                    StorageError::KeyNotActive(predecessor_id)
                } else {
                    StorageError::NotFound(format!("key {}", predecessor_id))
                });
            }
            insert_key_row(&tx, &successor)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_keys(&self, owner_id: &str) -> StorageResult<Vec<KeyRecord>> {
        let owner_id = owner_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM public_keys WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
                KEY_COLUMNS
            ))?;
            let keys = stmt
                .query_map(params![owner_id], key_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(keys)
        })
        .await
    }
}
