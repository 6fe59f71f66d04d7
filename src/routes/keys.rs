//! Key listing and rotation for the signing identity.

use axum::{extract::State, response::IntoResponse, Json};
use base64::{engine::general_purpose, Engine as _};

use crate::auth::middleware::{AppState, AuthenticatedKey};
use crate::error::AppError;
use crate::models::{KeyInfo, RotateKeyResponse};

/// GET /api/v1/keys — All keys of the caller's identity, oldest first
pub async fn list_keys(
    caller: AuthenticatedKey,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let keys: Vec<KeyInfo> = state
        .store()
        .list_keys(&caller.owner_id)
        .await?
        .into_iter()
        .map(KeyInfo::from)
        .collect();

    Ok(Json(keys))
}

/// POST /api/v1/keys/rotate — Replace the signing key with a fresh one
///
/// Storing the successor and retiring the predecessor happen in one store
/// operation; if it fails the old key stays the active one. The predecessor
/// may keep authenticating from the fast tier until its cache entry expires.
pub async fn rotate_key(
    caller: AuthenticatedKey,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store();

    let existing = store
        .find_key(&caller.key_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Key not found".to_string()))?;

    // Authenticated from a stale cache entry after a previous rotation.
    if !existing.is_active() {
        return Err(AppError::Conflict("Key has already been rotated".to_string()));
    }

    let rotator = state.rotator.clone();
    let owner_id = caller.owner_id.clone();
    let previous = existing.clone();
    let pair =
        tokio::task::spawn_blocking(move || rotator.rotate(&owner_id, Some(&previous))).await??;

    // A concurrent rotation that retired the key first surfaces as 409 here.
    store.rotate_key(&pair.record, &existing.key_id).await?;

    tracing::info!(
        action = "key_retired",
        key_id = %existing.key_id,
        successor_key_id = %pair.record.key_id,
        owner_id = %caller.owner_id,
        "Retired predecessor key"
    );

    let rotated_at = pair
        .record
        .rotation
        .as_ref()
        .map(|r| r.rotated_at)
        .unwrap_or(pair.record.created_at);

    Ok(Json(RotateKeyResponse {
        key_id: pair.record.key_id.clone(),
        previous_key_id: existing.key_id,
        private_key: general_purpose::STANDARD.encode(pair.private_key.as_slice()),
        public_key: general_purpose::STANDARD.encode(&pair.record.public_key),
        fingerprint: pair.record.fingerprint.clone(),
        rotated_at,
    }))
}
