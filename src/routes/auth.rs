//! Identity provisioning.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use base64::{engine::general_purpose, Engine as _};

use crate::auth::middleware::AppState;
use crate::error::AppError;
use crate::models::{SignupRequest, SignupResponse, StoredUser};

const MAX_EMAIL_LEN: usize = 254;

/// Trim, lowercase and sanity-check an email address.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let invalid = || AppError::BadRequest("Invalid email address".to_string());

    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(email)
}

/// POST /api/v1/auth/signup — Provision an identity and its first key pair
///
/// The private key is in this response and nowhere else.
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&req.email)?;
    let user_id = nanoid::nanoid!(12);

    // RSA generation is CPU-bound; keep it off the async workers.
    let generator = state.generator;
    let owner_id = user_id.clone();
    let pair = tokio::task::spawn_blocking(move || generator.generate(&owner_id)).await??;

    let user = StoredUser {
        id: user_id,
        email,
        created_at: crate::unix_now(),
    };
    state.store().insert_user_with_key(&user, &pair.record).await?;

    tracing::info!(
        action = "user_provisioned",
        user_id = %user.id,
        key_id = %pair.record.key_id,
        key_size = pair.record.key_size,
        "New identity provisioned"
    );

    let response = SignupResponse {
        user_id: user.id,
        key_id: pair.record.key_id.clone(),
        private_key: general_purpose::STANDARD.encode(pair.private_key.as_slice()),
        public_key: general_purpose::STANDARD.encode(&pair.record.public_key),
        fingerprint: pair.record.fingerprint.clone(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}
