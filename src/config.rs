use axum::http::HeaderName;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::auth::DEFAULT_TIMESTAMP_WINDOW_SECS;
use crate::keys::{DEFAULT_KEY_SIZE, MIN_KEY_SIZE};
use crate::storage::{DEFAULT_KEY_CACHE_TTL_SECS, MAX_PRESIGNED_URL_TTL_SECS};

/// Upper bound for `KEY_CACHE_TTL_SECS`, which is also how long a retired key
/// can keep authenticating.
pub const MAX_KEY_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Clone)]
pub struct Config {
    // Storage tiers
    pub redis_url: String,
    pub database_path: PathBuf,

    // Server
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,

    // Authentication headers
    pub api_key_header: String,
    pub timestamp_header: String,
    pub signature_header: String,

    // Authentication policy
    pub timestamp_window_secs: u64,
    pub key_cache_ttl_secs: u64,
    pub key_size: usize,

    // Object storage
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint_url: Option<String>,
    pub upload_url_ttl_secs: u64,
    pub download_url_ttl_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("database_path", &self.database_path)
            .field("bind_addr", &self.bind_addr)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("api_key_header", &self.api_key_header)
            .field("timestamp_header", &self.timestamp_header)
            .field("signature_header", &self.signature_header)
            .field("timestamp_window_secs", &self.timestamp_window_secs)
            .field("key_cache_ttl_secs", &self.key_cache_ttl_secs)
            .field("key_size", &self.key_size)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint_url", &self.s3_endpoint_url)
            .field("upload_url_ttl_secs", &self.upload_url_ttl_secs)
            .field("download_url_ttl_secs", &self.download_url_ttl_secs)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        let redis_url = required_var("REDIS_URL")?;
        let database_path =
            PathBuf::from(env::var("DATABASE_PATH").unwrap_or_else(|_| "keygate.db".to_string()));

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;
        let max_body_bytes = parse_env_or_default("MAX_BODY_BYTES", 52_428_800)?;

        // Headers
        let api_key_header = header_name_or_default("API_KEY_HEADER", "X-API-Key")?;
        let timestamp_header = header_name_or_default("TIMESTAMP_HEADER", "X-Timestamp")?;
        let signature_header = header_name_or_default("SIGNATURE_HEADER", "X-Signature")?;

        // Policy
        let timestamp_window_secs =
            parse_env_or_default("TIMESTAMP_WINDOW_SECS", DEFAULT_TIMESTAMP_WINDOW_SECS)?;
        let key_cache_ttl_secs =
            parse_env_or_default("KEY_CACHE_TTL_SECS", DEFAULT_KEY_CACHE_TTL_SECS)?;
        if key_cache_ttl_secs == 0 || key_cache_ttl_secs > MAX_KEY_CACHE_TTL_SECS {
            return Err(ConfigError::InvalidValue(
                "KEY_CACHE_TTL_SECS".to_string(),
                format!("must be between 1 and {}", MAX_KEY_CACHE_TTL_SECS),
            ));
        }
        let key_size = parse_env_or_default("KEY_SIZE", DEFAULT_KEY_SIZE)?;
        if key_size < MIN_KEY_SIZE {
            return Err(ConfigError::InvalidValue(
                "KEY_SIZE".to_string(),
                format!("must be at least {} bits", MIN_KEY_SIZE),
            ));
        }

        // Object storage; credentials come from the AWS default chain
        let s3_bucket = required_var("AWS_BUCKET_NAME")?;
        let s3_region = required_var("AWS_REGION")?;
        let s3_endpoint_url = match env::var("S3_ENDPOINT_URL") {
            Ok(url) if !url.is_empty() => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigError::InvalidValue(
                        "S3_ENDPOINT_URL".to_string(),
                        "must start with http:// or https://".to_string(),
                    ));
                }
                Some(url)
            }
            _ => None,
        };
        let upload_url_ttl_secs = presign_ttl("UPLOAD_URL_TTL_SECS", 240)?;
        let download_url_ttl_secs = presign_ttl("DOWNLOAD_URL_TTL_SECS", 14_400)?;

        Ok(Config {
            redis_url,
            database_path,
            bind_addr,
            max_body_bytes,
            api_key_header,
            timestamp_header,
            signature_header,
            timestamp_window_secs,
            key_cache_ttl_secs,
            key_size,
            s3_bucket,
            s3_region,
            s3_endpoint_url,
            upload_url_ttl_secs,
            download_url_ttl_secs,
        })
    }
}

/// Required and non-empty.
fn required_var(key: &str) -> Result<String, ConfigError> {
    let value = env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "cannot be empty".to_string(),
        ));
    }
    Ok(value)
}

fn header_name_or_default(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    HeaderName::from_bytes(value.as_bytes()).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), format!("not a valid header name: {}", value))
    })?;
    Ok(value)
}

/// Presigned URL lifetime: positive and within what SigV4 allows.
fn presign_ttl(key: &str, default: u64) -> Result<u64, ConfigError> {
    let ttl = parse_env_or_default(key, default)?;
    if ttl == 0 || ttl > MAX_PRESIGNED_URL_TTL_SECS {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be between 1 and {}", MAX_PRESIGNED_URL_TTL_SECS),
        ));
    }
    Ok(ttl)
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
