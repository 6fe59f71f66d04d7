//! Axum middleware and extractors for signed requests.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::gate::{AuthOutcome, AuthRequest, AuthenticationGate};
use super::timestamp::{Clock, SystemClock, TimestampValidator};
use crate::config::Config;
use crate::error::AppError;
use crate::keys::{KeyGenerationError, KeyPairGenerator, KeyRotator, DEFAULT_PUBLIC_EXPONENT};
use crate::storage::{CacheTier, KeyStore, ObjectStorage, PublicKeyCache};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<PublicKeyCache>,
    pub gate: Arc<AuthenticationGate>,
    pub generator: KeyPairGenerator,
    pub rotator: KeyRotator,
    pub objects: Arc<dyn ObjectStorage>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn KeyStore>,
        fast: Arc<dyn CacheTier>,
        objects: Arc<dyn ObjectStorage>,
    ) -> Result<Self, KeyGenerationError> {
        Self::with_clock(config, store, fast, objects, Arc::new(SystemClock))
    }

    /// Like [`AppState::new`] with an explicit clock for timestamp checks.
    pub fn with_clock(
        config: Config,
        store: Arc<dyn KeyStore>,
        fast: Arc<dyn CacheTier>,
        objects: Arc<dyn ObjectStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeyGenerationError> {
        let generator = KeyPairGenerator::new(config.key_size, DEFAULT_PUBLIC_EXPONENT)?;
        let keys = Arc::new(PublicKeyCache::new(fast, store, config.key_cache_ttl_secs));
        let timestamps = TimestampValidator::with_clock(config.timestamp_window_secs, clock);
        let gate = Arc::new(AuthenticationGate::new(timestamps, keys.clone()));

        Ok(Self {
            keys,
            gate,
            generator,
            rotator: KeyRotator::new(generator),
            objects,
            config: Arc::new(config),
        })
    }

    /// The durable key store.
    pub fn store(&self) -> &Arc<dyn KeyStore> {
        self.keys.store()
    }
}

/// The key that signed the current request.
///
/// Inserted by [`require_signature`]; handlers behind it extract it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedKey {
    pub key_id: String,
    pub owner_id: String,
}

impl<S> FromRequestParts<S> for AuthenticatedKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedKey>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reject any request not signed by an active key.
///
/// The body is buffered once (up to `max_body_bytes`), checked, and handed to
/// the next handler unchanged. Every rejection is the same generic 401; the
/// reason only goes to the log.
pub async fn require_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, state.config.max_body_bytes)
        .await
        .map_err(|_| AppError::BadRequest("Request body too large or unreadable".to_string()))?;

    let config = &state.config;
    let auth_request = AuthRequest {
        method: parts.method.as_str(),
        path: parts.uri.path(),
        api_key_id: header_value(&parts.headers, &config.api_key_header),
        timestamp: header_value(&parts.headers, &config.timestamp_header),
        signature: header_value(&parts.headers, &config.signature_header),
        body: &bytes,
    };

    match state.gate.evaluate(&auth_request).await {
        AuthOutcome::Accepted(record) => {
            tracing::debug!(
                key_id = %record.key_id,
                owner_id = %record.owner_id,
                "Request signature accepted"
            );
            parts.extensions.insert(AuthenticatedKey {
                key_id: record.key_id,
                owner_id: record.owner_id,
            });
            Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
        }
        AuthOutcome::Rejected(reason) => {
            tracing::warn!(
                action = "auth_rejected",
                reason = %reason,
                method = %parts.method,
                path = %parts.uri.path(),
                key_id = ?parts.headers.get(config.api_key_header.as_str()),
                "Rejected unsigned or invalid request"
            );
            Err(AppError::Unauthorized("Unauthorized".to_string()))
        }
    }
}
