//! Redis store implementation with connection management

use crate::Result;
use redis::{aio::ConnectionManager, AsyncCommands};

/// Redis store with automatic reconnection
///
/// Cloning is cheap: the underlying [`ConnectionManager`] multiplexes a
/// single connection and every clone shares it, so each scheduler task can
/// hold its own handle.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Get connection manager (for advanced operations)
    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }

    // ============================================================================
    // Key-Value Operations
    // ============================================================================

    /// GET - Get value by key
    pub async fn get<T: redis::FromRedisValue>(&mut self, key: &str) -> Result<Option<T>> {
        self.conn.get(key).await
    }

    /// SET - Set key to value (no expiry)
    pub async fn set<V>(&mut self, key: &str, value: V) -> Result<()>
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.set(key, value).await
    }

    /// SETEX - Set key with expiry in seconds
    pub async fn set_ex<V>(&mut self, key: &str, value: V, seconds: u64) -> Result<()>
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.set_ex(key, value, seconds).await
    }

    /// DEL - Delete one or more keys
    pub async fn del<K>(&mut self, keys: K) -> Result<i64>
    where
        K: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.del(keys).await
    }

    /// EXISTS - Check if key exists
    pub async fn exists(&mut self, key: &str) -> Result<bool> {
        self.conn.exists(key).await
    }

    /// EXPIRE - Set expiry time in seconds
    pub async fn expire(&mut self, key: &str, seconds: i64) -> Result<bool> {
        self.conn.expire(key, seconds).await
    }

    /// TTL - Get time to live in seconds
    pub async fn ttl(&mut self, key: &str) -> Result<i64> {
        self.conn.ttl(key).await
    }

    // ============================================================================
    // Atomic Operations
    // ============================================================================

    /// GETDEL - Read and delete a key in one atomic step
    ///
    /// Returns `None` when the key did not exist. This is the claim
    /// primitive: exactly one concurrent caller observes the value.
    pub async fn get_del<T: redis::FromRedisValue>(&mut self, key: &str) -> Result<Option<T>> {
        redis::cmd("GETDEL").arg(key).query_async(&mut self.conn).await
    }

    // ============================================================================
    // List Operations (time buckets)
    // ============================================================================

    /// RPUSH - Append to tail of list, returns new length
    pub async fn rpush<V>(&mut self, key: &str, value: V) -> Result<i64>
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.rpush(key, value).await
    }

    /// LPOP - Pop from head of list
    pub async fn lpop<T: redis::FromRedisValue>(&mut self, key: &str) -> Result<Option<T>> {
        self.conn.lpop(key, None).await
    }

    /// LRANGE - Read a slice of the list without removing it
    pub async fn lrange<T: redis::FromRedisValue>(
        &mut self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<T>> {
        self.conn.lrange(key, start, stop).await
    }

    /// LLEN - Get list length
    pub async fn llen(&mut self, key: &str) -> Result<i64> {
        self.conn.llen(key).await
    }

    // ============================================================================
    // Hash Operations (dead-letter table)
    // ============================================================================

    /// HSET - Set hash field, returns 1 if the field is new
    pub async fn hset<V>(&mut self, key: &str, field: &str, value: V) -> Result<i64>
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        self.conn.hset(key, field, value).await
    }

    /// HGET - Get hash field
    pub async fn hget<T: redis::FromRedisValue>(
        &mut self,
        key: &str,
        field: &str,
    ) -> Result<Option<T>> {
        self.conn.hget(key, field).await
    }

    /// HLEN - Number of fields in a hash
    pub async fn hlen(&mut self, key: &str) -> Result<i64> {
        self.conn.hlen(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_list_append_pop_order() -> Result<()> {
        let mut store = RedisStore::connect(&redis_url()).await?;

        store.del("store_test_bucket").await?;
        store.rpush("store_test_bucket", "first").await?;
        store.rpush("store_test_bucket", "second").await?;

        assert_eq!(store.llen("store_test_bucket").await?, 2);
        let head: Option<String> = store.lpop("store_test_bucket").await?;
        assert_eq!(head.as_deref(), Some("first"));
        let head: Option<String> = store.lpop("store_test_bucket").await?;
        assert_eq!(head.as_deref(), Some("second"));
        let head: Option<String> = store.lpop("store_test_bucket").await?;
        assert_eq!(head, None);

        Ok(())
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_get_del_consumes_once() -> Result<()> {
        let mut store = RedisStore::connect(&redis_url()).await?;

        store.set("store_test_claim", "true").await?;
        let first: Option<String> = store.get_del("store_test_claim").await?;
        assert_eq!(first.as_deref(), Some("true"));
        let second: Option<String> = store.get_del("store_test_claim").await?;
        assert_eq!(second, None);

        Ok(())
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_expiry_survives_append() -> Result<()> {
        let mut store = RedisStore::connect(&redis_url()).await?;

        store.del("store_test_ttl").await?;
        store.rpush("store_test_ttl", "entry").await?;
        store.expire("store_test_ttl", 180).await?;
        store.rpush("store_test_ttl", "entry2").await?;

        let ttl = store.ttl("store_test_ttl").await?;
        assert!(ttl > 0 && ttl <= 180);

        store.del("store_test_ttl").await?;
        Ok(())
    }
}
