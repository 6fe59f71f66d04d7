pub mod auth;
pub mod config;
pub mod error;
pub mod keys;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod storage;

/// Seconds since the Unix epoch (0 if the clock is before it).
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
