//! Redis fast tier.
//!
//! Values are written with `SET key value EX ttl`, so Redis itself enforces
//! the staleness bound.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{CacheTier, StorageResult};

#[derive(Clone)]
pub struct RedisCache {
    con: MultiplexedConnection,
}

impl RedisCache {
    /// Open a multiplexed connection to `redis_url`.
    pub async fn connect(redis_url: &str) -> StorageResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let con = client.get_multiplexed_async_connection().await?;
        Ok(Self { con })
    }

    pub fn from_connection(con: MultiplexedConnection) -> Self {
        Self { con }
    }
}

#[async_trait]
impl CacheTier for RedisCache {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let mut con = self.con.clone();
        let value: Option<Vec<u8>> = con.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> StorageResult<()> {
        let mut con = self.con.clone();
        con.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }
}
