//! Pre-signed upload and download URLs.

use axum::{extract::State, response::IntoResponse, Json};

use crate::auth::middleware::{AppState, AuthenticatedKey};
use crate::error::AppError;
use crate::models::{
    DownloadRequest, DownloadResponse, UploadRequest, UploadResponse, UploadStatus,
};

const UPLOAD_PREFIX: &str = "videos";
const MAX_FILENAME_LEN: usize = 255;

fn validate_filename(filename: &str) -> Result<(), AppError> {
    if filename.trim().is_empty()
        || filename.len() > MAX_FILENAME_LEN
        || filename.contains(['/', '\\'])
        || filename.chars().any(char::is_control)
    {
        return Err(AppError::BadRequest("Invalid filename".to_string()));
    }
    Ok(())
}

/// POST /api/v1/upload — Reserve an object path and return a PUT URL for it
pub async fn request_upload(
    caller: AuthenticatedKey,
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_filename(&req.filename)?;

    let id = uuid::Uuid::new_v4().to_string();
    let key = format!("{}/{}", UPLOAD_PREFIX, id);
    let ttl = state.config.upload_url_ttl_secs;
    let upload = state
        .objects
        .request_upload_url(&key, &req.content_type, ttl)
        .await?;

    tracing::info!(
        action = "upload_url_issued",
        upload_id = %id,
        owner_id = %caller.owner_id,
        content_type = %req.content_type,
        "Issued upload URL"
    );

    Ok(Json(UploadResponse {
        id,
        original_filename: req.filename,
        path: upload.path,
        url: upload.url,
        content_type: req.content_type,
        status: UploadStatus::Pending,
        expires_in: ttl,
        user_id: caller.owner_id,
    }))
}

/// POST /api/v1/download — Return a time-limited GET URL for an object
pub async fn request_download(
    caller: AuthenticatedKey,
    State(state): State<AppState>,
    Json(req): Json<DownloadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ttl = state.config.download_url_ttl_secs;
    let url = state.objects.request_download_url(&req.path, ttl).await?;

    tracing::info!(
        action = "download_url_issued",
        path = %req.path,
        owner_id = %caller.owner_id,
        "Issued download URL"
    );

    Ok(Json(DownloadResponse {
        url,
        expires_in: ttl,
    }))
}
