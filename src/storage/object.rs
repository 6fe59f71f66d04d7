//! Object storage: pre-signed upload and download URLs.
//!
//! [`S3Storage`] hands out SigV4 presigned S3 URLs; the client talks to the
//! bucket directly and this service never sees the object bytes.

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use std::time::Duration;

/// SigV4 presigned URLs cannot outlive one week.
pub const MAX_PRESIGNED_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Error type for URL issuance.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStorageError {
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Failed to presign request: {0}")]
    Presign(String),
}

/// A pre-signed upload target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadUrl {
    pub url: String,
    pub path: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// URL allowing a single `PUT` of `mime_type` content to `key` for `ttl_secs`.
    async fn request_upload_url(
        &self,
        key: &str,
        mime_type: &str,
        ttl_secs: u64,
    ) -> Result<UploadUrl, ObjectStorageError>;

    /// URL allowing `GET` of `key` for `ttl_secs`.
    async fn request_download_url(
        &self,
        key: &str,
        ttl_secs: u64,
    ) -> Result<String, ObjectStorageError>;
}

/// Object paths are relative, `/`-separated, and limited to a safe charset.
pub fn validate_object_path(path: &str) -> Result<(), ObjectStorageError> {
    let invalid = || ObjectStorageError::InvalidPath(path.to_string());

    if path.is_empty() || path.len() > 512 || path.starts_with('/') || path.ends_with('/') {
        return Err(invalid());
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid());
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(invalid());
        }
    }
    Ok(())
}

fn validate_content_type(content_type: &str) -> Result<(), ObjectStorageError> {
    let valid = content_type.len() <= 127
        && content_type.split_once('/').is_some_and(|(kind, sub)| {
            !kind.is_empty()
                && !sub.is_empty()
                && content_type.chars().filter(|&c| c == '/').count() == 1
                && content_type
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '+' | '_'))
        });
    if valid {
        Ok(())
    } else {
        Err(ObjectStorageError::InvalidContentType(
            content_type.to_string(),
        ))
    }
}

/// Presigns S3 `PutObject`/`GetObject` requests with path-style addressing.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from the default AWS credential chain.
    ///
    /// `endpoint_url` points the client at an S3-compatible store instead of AWS.
    pub async fn connect(bucket: &str, region: &str, endpoint_url: Option<&str>) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared).force_path_style(true);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Self::new(Client::from_conf(builder.build()), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn presigning_config(ttl_secs: u64) -> Result<PresigningConfig, ObjectStorageError> {
    PresigningConfig::expires_in(Duration::from_secs(ttl_secs))
        .map_err(|e| ObjectStorageError::Presign(e.to_string()))
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn request_upload_url(
        &self,
        key: &str,
        mime_type: &str,
        ttl_secs: u64,
    ) -> Result<UploadUrl, ObjectStorageError> {
        validate_object_path(key)?;
        validate_content_type(mime_type)?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(mime_type)
            .presigned(presigning_config(ttl_secs)?)
            .await
            .map_err(|e| ObjectStorageError::Presign(DisplayErrorContext(&e).to_string()))?;
        Ok(UploadUrl {
            url: request.uri().to_string(),
            path: key.to_string(),
        })
    }

    async fn request_download_url(
        &self,
        key: &str,
        ttl_secs: u64,
    ) -> Result<String, ObjectStorageError> {
        validate_object_path(key)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config(ttl_secs)?)
            .await
            .map_err(|e| ObjectStorageError::Presign(DisplayErrorContext(&e).to_string()))?;
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials};

    fn client(endpoint_url: Option<&str>) -> Client {
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new(
                "AKIDEXAMPLE",
                "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
                None,
                None,
                "static",
            ))
            .force_path_style(true);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Client::from_conf(builder.build())
    }

    fn storage() -> S3Storage {
        S3Storage::new(client(None), "media-bucket")
    }

    #[test]
    fn test_path_validation() {
        assert!(validate_object_path("videos/abc-123").is_ok());
        assert!(validate_object_path("videos/clip.mp4").is_ok());
        assert!(validate_object_path("").is_err());
        assert!(validate_object_path("/videos/a").is_err());
        assert!(validate_object_path("videos/").is_err());
        assert!(validate_object_path("videos//a").is_err());
        assert!(validate_object_path("videos/../secrets").is_err());
        assert!(validate_object_path("videos/a b").is_err());
        assert!(validate_object_path("videos/a?x=1").is_err());
    }

    #[test]
    fn test_content_type_validation() {
        assert!(validate_content_type("video/mp4").is_ok());
        assert!(validate_content_type("application/vnd.api+json").is_ok());
        assert!(validate_content_type("video").is_err());
        assert!(validate_content_type("video/").is_err());
        assert!(validate_content_type("a/b/c").is_err());
        assert!(validate_content_type("video/mp4\nx").is_err());
    }

    #[tokio::test]
    async fn test_upload_url_is_sigv4_presigned_put() {
        let upload = storage()
            .request_upload_url("videos/v1", "video/mp4", 240)
            .await
            .unwrap();

        assert_eq!(upload.path, "videos/v1");
        assert!(upload
            .url
            .starts_with("https://s3.us-east-1.amazonaws.com/media-bucket/videos/v1?"));
        assert!(upload.url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(upload.url.contains("X-Amz-Credential=AKIDEXAMPLE"));
        assert!(upload.url.contains("X-Amz-Expires=240"));
        assert!(upload.url.contains("X-Amz-Signature="));
        // The content type is a signed header, so the PUT must send the same one.
        assert!(upload.url.contains("content-type"));
    }

    #[tokio::test]
    async fn test_download_url_is_sigv4_presigned_get() {
        let url = storage()
            .request_download_url("videos/v1", 14_400)
            .await
            .unwrap();

        assert!(url.starts_with("https://s3.us-east-1.amazonaws.com/media-bucket/videos/v1?"));
        assert!(url.contains("X-Amz-Expires=14400"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(!url.contains("content-type"));
    }

    #[tokio::test]
    async fn test_custom_endpoint() {
        let storage = S3Storage::new(client(Some("http://localhost:9000")), "media-bucket");
        assert_eq!(storage.bucket(), "media-bucket");

        let url = storage.request_download_url("videos/v1", 60).await.unwrap();
        assert!(url.starts_with("http://localhost:9000/media-bucket/videos/v1?"));
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let storage = storage();
        assert!(matches!(
            storage.request_upload_url("../etc", "video/mp4", 10).await,
            Err(ObjectStorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.request_upload_url("videos/a", "bogus", 10).await,
            Err(ObjectStorageError::InvalidContentType(_))
        ));
        assert!(matches!(
            storage.request_download_url("", 10).await,
            Err(ObjectStorageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_expiry_beyond_presign_limit() {
        let err = storage()
            .request_download_url("videos/v1", MAX_PRESIGNED_URL_TTL_SECS + 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStorageError::Presign(_)));
    }
}
