//! API route handlers.

pub mod auth;
pub mod keys;
pub mod upload;

use crate::auth::middleware::{require_signature, AppState};
use axum::{middleware, response::IntoResponse, routing::get, routing::post, Json, Router};

/// GET /health — Liveness check
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the API router with all endpoints.
///
/// Everything except `/health` and signup sits behind [`require_signature`].
/// Routes use full paths (no `nest`) so the signed path matches the URI the
/// client sent.
pub fn api_router(state: &AppState) -> Router<AppState> {
    let signed = Router::new()
        .route("/api/v1/keys", get(keys::list_keys))
        .route("/api/v1/keys/rotate", post(keys::rotate_key))
        .route("/api/v1/upload", post(upload::request_upload))
        .route("/api/v1/download", post(upload::request_download))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_signature,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/signup", post(auth::signup))
        .merge(signed)
}
