//! The four Lua programs backing the lock protocol, and a thin registry
//! that invokes them with a single retry on transient connection errors.
//!
//! `redis::Script::invoke_async` already retries on a server-side
//! `NOSCRIPT` by falling back from `EVALSHA` to `EVAL` and re-caching the
//! hash, so the registry does not need to track script hashes itself (spec
//! §4.1's "robust call-with-fallback"). What it adds is a retry for
//! connection-level failures, mirroring upstream's
//! `retry(stop_max_attempt_number=2)` decorator around `ConnectionError`/
//! `TimeoutError`.

use deadpool_redis::{Connection, Pool};
use dlock_api::LockError;
use redis::Script;

/// `UNLOCK(lock, signal; id, signal_expire_ms)`.
///
/// Deletes the lock key and wakes waiters, but only if `id` still owns it.
pub const UNLOCK: &str = r"
if redis.call('get', KEYS[1]) ~= ARGV[1] then
    return 1
else
    redis.call('del', KEYS[2])
    redis.call('lpush', KEYS[2], 1)
    redis.call('pexpire', KEYS[2], ARGV[2])
    redis.call('del', KEYS[1])
    return 0
end
";

/// `EXTEND(lock; id, new_expire_s)`.
///
/// Refreshes the lock's TTL, but only if `id` still owns it and it has one.
pub const EXTEND: &str = r"
if redis.call('get', KEYS[1]) ~= ARGV[1] then
    return 1
elseif redis.call('ttl', KEYS[1]) < 0 then
    return 2
else
    redis.call('expire', KEYS[1], ARGV[2])
    return 0
end
";

/// `RESET(lock, signal; signal_expire_ms)`.
///
/// Unconditionally clears the lock and wakes waiters.
pub const RESET: &str = r"
redis.call('del', KEYS[2])
redis.call('lpush', KEYS[2], 1)
redis.call('pexpire', KEYS[2], ARGV[1])
return redis.call('del', KEYS[1])
";

/// `RESET_ALL()`.
///
/// Scans every `lock:*` key, clears and signals its waiter list, deletes
/// the lock key, and returns the count cleared.
pub const RESET_ALL: &str = r"
local locks = redis.call('keys', 'lock:*')
local signal
for _, lock in pairs(locks) do
    signal = 'lock-signal:' .. string.sub(lock, 6)
    redis.call('del', signal)
    redis.call('lpush', signal, 1)
    redis.call('expire', signal, 1)
    redis.call('del', lock)
end
return #locks
";

/// Outcome of the `UNLOCK` script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Released,
    NotOwner,
}

/// Outcome of the `EXTEND` script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutcome {
    Extended,
    NotOwner,
    NoExpiry,
}

/// Owns the four compiled Lua programs used by the lock protocol.
///
/// Cheaply cloneable: `redis::Script` is just the source plus its
/// precomputed SHA1, so registries can be freely shared across handles.
#[derive(Clone)]
pub struct ScriptRegistry {
    unlock: Script,
    extend: Script,
    reset: Script,
    reset_all: Script,
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        Self {
            unlock: Script::new(UNLOCK),
            extend: Script::new(EXTEND),
            reset: Script::new(RESET),
            reset_all: Script::new(RESET_ALL),
        }
    }
}

impl ScriptRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn unlock(
        &self,
        pool: &Pool,
        lock_key: &str,
        signal_key: &str,
        id: &str,
        signal_expire_ms: i64,
    ) -> Result<UnlockOutcome, LockError> {
        let mut c = conn(pool).await?;
        let code: i64 = invoke_with_retry(pool, &mut c, || {
            self.unlock
                .key(lock_key)
                .key(signal_key)
                .arg(id)
                .arg(signal_expire_ms)
        })
        .await?;

        match code {
            0 => Ok(UnlockOutcome::Released),
            1 => Ok(UnlockOutcome::NotOwner),
            other => Err(LockError::ProtocolViolation(other, "UNLOCK")),
        }
    }

    pub async fn extend(
        &self,
        pool: &Pool,
        lock_key: &str,
        id: &str,
        new_expire_s: i64,
    ) -> Result<ExtendOutcome, LockError> {
        let mut c = conn(pool).await?;
        let code: i64 = invoke_with_retry(pool, &mut c, || {
            self.extend.key(lock_key).arg(id).arg(new_expire_s)
        })
        .await?;

        match code {
            0 => Ok(ExtendOutcome::Extended),
            1 => Ok(ExtendOutcome::NotOwner),
            2 => Ok(ExtendOutcome::NoExpiry),
            other => Err(LockError::ProtocolViolation(other, "EXTEND")),
        }
    }

    pub async fn reset(
        &self,
        pool: &Pool,
        lock_key: &str,
        signal_key: &str,
        signal_expire_ms: i64,
    ) -> Result<(), LockError> {
        let mut c = conn(pool).await?;
        let _deleted: i64 = invoke_with_retry(pool, &mut c, || {
            self.reset
                .key(lock_key)
                .key(signal_key)
                .arg(signal_expire_ms)
        })
        .await?;
        Ok(())
    }

    pub async fn reset_all(&self, pool: &Pool) -> Result<u64, LockError> {
        let mut c = conn(pool).await?;
        let count: i64 = match self.reset_all.invoke_async(&mut c).await {
            Ok(value) => value,
            Err(e) if e.is_connection_dropped() || e.is_timeout() => {
                tracing::warn!(error = %e, "redis connection error, retrying RESET_ALL once");
                let mut c = conn(pool).await?;
                self.reset_all
                    .invoke_async(&mut c)
                    .await
                    .map_err(LockError::Backend)?
            }
            Err(e) => return Err(LockError::Backend(e)),
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

async fn conn(pool: &Pool) -> Result<Connection, LockError> {
    pool.get()
        .await
        .map_err(|e| LockError::Connection(e.to_string()))
}

/// Invoke a pre-built script invocation, retrying once on a transient
/// connection error with a fresh pooled connection. `redis::Script` itself
/// already retries on `NOSCRIPT`; this only covers connection drops/
/// timeouts, which require a brand new connection to recover from.
async fn invoke_with_retry<'a, T, F>(
    pool: &Pool,
    c: &mut Connection,
    build: F,
) -> Result<T, LockError>
where
    T: redis::FromRedisValue,
    F: Fn() -> redis::ScriptInvocation<'a>,
{
    match build().invoke_async(c).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_connection_dropped() || e.is_timeout() => {
            tracing::warn!(error = %e, "redis connection error, retrying script invocation once");
            let mut fresh = conn(pool).await?;
            build()
                .invoke_async(&mut fresh)
                .await
                .map_err(LockError::Backend)
        }
        Err(e) => Err(LockError::Backend(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_cheaply_cloneable() {
        let registry = ScriptRegistry::new();
        let _clone = registry.clone();
    }
}
