//! Redis durable tier over a deadpool connection pool.

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use super::durable::{DurableResult, DurableTier};

/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 500;

/// Durable tier backed by Redis.
///
/// Every call checks a connection out of the pool and issues one command
/// (SCAN issues one per cursor step). Errors are returned to the caller.
#[derive(Clone)]
pub struct RedisDurableTier {
    pool: Pool,
}

impl RedisDurableTier {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl DurableTier for RedisDurableTier {
    async fn get(&self, key: &str) -> DurableResult<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        tracing::trace!(key = %key, hit = value.is_some(), "redis GET");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> DurableResult<()> {
        let mut conn = self.pool.get().await?;
        conn.set::<_, _, ()>(key, value).await?;
        tracing::trace!(key = %key, "redis SET");
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> DurableResult<()> {
        let mut conn = self.pool.get().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        tracing::trace!(key = %key, ttl_secs = %ttl_secs, "redis SETEX");
        Ok(())
    }

    async fn delete(&self, key: &str) -> DurableResult<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        tracing::trace!(key = %key, "redis DEL");
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> DurableResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(keys).await?;
        tracing::trace!(count = keys.len(), "redis DEL (batch)");
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> DurableResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn scan(&self, pattern: &str) -> DurableResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may report a key more than once while the keyspace rehashes.
        keys.sort_unstable();
        keys.dedup();
        tracing::trace!(pattern = %pattern, count = keys.len(), "redis SCAN");
        Ok(keys)
    }

    async fn ping(&self) -> DurableResult<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
