//! Cross-process cache-stampede protection on top of `dlock-redis`.
//!
//! Mirrors the double-checked locking `EmbeddingCache::get` uses against an
//! in-process `moka` cache, but coalesces concurrent producers *across
//! processes* instead of within one: the lock, not the cache entry itself,
//! is what readers wait on.

use std::future::Future;
use std::time::Duration;

use deadpool_redis::Pool;
use dlock_api::{LockError, LockHandle};
use dlock_redis::{Lock, LockId};
use redis::AsyncCommands;

/// How long a value-producing lock is held for before it is assumed stuck
/// and another caller should be allowed to retry production.
const PRODUCE_LOCK_TTL: Duration = Duration::from_secs(30);

/// A Redis-backed cache whose misses are coordinated by a [`Lock`] rather
/// than left to race.
pub struct Cache {
    pool: Pool,
}

impl Cache {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a lock scoped to `key`, without touching the cached value.
    /// Exposed directly so callers can compose their own acquire/produce/
    /// release sequence instead of using [`Self::get_or_set_under_lock`].
    pub fn lock(
        &self,
        key: &str,
        expire: Option<Duration>,
        id: Option<LockId>,
        auto_renewal: Option<Duration>,
    ) -> Result<Lock, LockError> {
        let mut builder = Lock::builder(self.pool.clone(), format!("cache-lock:{key}"));
        if let Some(expire) = expire {
            builder = builder.expire(expire);
        }
        if let Some(id) = id {
            builder = builder.id(id);
        }
        if let Some(interval) = auto_renewal {
            builder = builder.auto_renewal(interval);
        }
        builder.build()
    }

    /// Fetch `key`, producing and caching it under lock protection on a
    /// miss. Re-checks the cache after acquiring the lock, so only the
    /// first waiter actually calls `producer`; everyone else sees its
    /// result once the lock is released.
    pub async fn get_or_set_under_lock<F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl: Duration,
    ) -> Result<String, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, LockError>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let mut lock = self.lock(key, Some(PRODUCE_LOCK_TTL), None, None)?;
        lock.acquire(true, None).await?;

        let produced = async {
            if let Some(value) = self.get(key).await? {
                return Ok(value);
            }
            tracing::debug!(key, "cache miss under lock, invoking producer");
            let value = producer().await?;
            self.set(key, &value, ttl).await?;
            Ok(value)
        }
        .await;

        lock.release().await?;
        produced
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;
        conn.get(format!("cache:{key}"))
            .await
            .map_err(LockError::Backend)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), LockError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;
        conn.set_ex(format!("cache:{key}"), value, ttl.as_secs())
            .await
            .map_err(LockError::Backend)
    }
}
