//! Redis backend for `dlock-api`'s [`LockHandle`] trait.
//!
//! A lock named `foo` is the key `lock:foo`, holding an identifier string as
//! its value; `lock-signal:foo` is the wakeup list blocking waiters poll.
//! Mutual exclusion is enforced by `SET key value NX [EX seconds]`; release,
//! extend, and the crash-recovery resets are Lua scripts that check the
//! stored identifier before mutating anything (see [`scripts`]).
//!
//! # Guarantees
//!
//! Full mutual exclusion on a single Redis instance, for as long as the
//! lock's TTL outlives its critical section. Like any lease-based lock, a
//! long GC pause or network partition can let the TTL expire out from under
//! a still-running holder; [`Lock::builder`]'s `auto_renewal` narrows that
//! window but cannot close it. Redis Cluster and Sentinel failover can lose
//! a just-written lock key before it replicates, which briefly breaks
//! mutual exclusion — this implementation does not attempt to paper over
//! that with a multi-instance quorum algorithm.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use dlock_api::LockHandle;
//! use dlock_redis::{Lock, RedisConfig};
//!
//! let config = RedisConfig::new("redis://localhost:6379");
//! let pool = dlock_redis::connect(&config)?;
//! let mut lock = Lock::builder(pool, "my-resource")
//!     .expire(Duration::from_secs(30))
//!     .build()?;
//!
//! if lock.acquire(true, Some(Duration::from_secs(5))).await? {
//!     // critical section
//!     lock.release().await?;
//! }
//! ```

mod config;
mod handle;
mod id;
mod renewal;
mod reset;
mod scripts;
mod signal;

use deadpool_redis::{Config, Runtime};
use dlock_api::LockError;

pub use config::RedisConfig;
pub use handle::{Lock, LockBuilder};
pub use id::LockId;
pub use reset::reset_all;
pub use scripts::ScriptRegistry;

/// Build a connection pool from a [`RedisConfig`], ready to hand to
/// [`Lock::builder`].
pub fn connect(config: &RedisConfig) -> Result<deadpool_redis::Pool, LockError> {
    let cfg = Config::from_url(config.effective_url());
    cfg.builder()
        .map(|builder| {
            builder
                .max_size(config.pool_size)
                .wait_timeout(Some(config.connection_timeout))
                .runtime(Runtime::Tokio1)
                .build()
        })
        .map_err(|e| LockError::Connection(e.to_string()))?
        .map_err(|e| LockError::Connection(e.to_string()))
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use std::time::Duration;

    use dlock_api::LockHandle;
    use redis::AsyncCommands;

    use super::*;

    fn test_pool() -> deadpool_redis::Pool {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        connect(&RedisConfig::new(url)).expect("pool creation should succeed")
    }

    fn unique_name(prefix: &str) -> String {
        format!("{prefix}-{}", LockId::generate())
    }

    /// Runs the shared, backend-agnostic conformance suite from
    /// `dlock_api::testing` against a live Redis instance, exactly the way
    /// the teacher's `acteon-state-redis` integration tests call
    /// `acteon_state::testing::run_lock_conformance_tests` rather than
    /// reimplementing its assertions ad hoc.
    #[tokio::test]
    async fn conformance_suite_passes_against_a_live_redis() {
        let pool = test_pool();
        let prefix = unique_name("conformance");

        dlock_api::testing::run_lock_conformance_tests(|name| {
            Box::new(
                Lock::builder(pool.clone(), format!("{prefix}-{name}"))
                    .build()
                    .unwrap(),
            )
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn acquire_ttl_and_release_round_trip() {
        let name = unique_name("foobar");
        let mut lock = Lock::builder(test_pool(), &name)
            .expire(Duration::from_secs(100))
            .build()
            .unwrap();

        assert!(lock.acquire(false, None).await.unwrap());
        assert!(lock.locked().await.unwrap());
        assert_eq!(lock.get_owner_id().await.unwrap().as_deref(), Some(lock.id()));

        lock.release().await.unwrap();
        assert!(!lock.locked().await.unwrap());
    }

    /// Literal §8 scenario: acquire `foobar` with `expire=100`, check
    /// `TTL <= 100`; `extend(1000)`; check `TTL > 100`.
    #[tokio::test]
    async fn extend_raises_the_ttl_past_the_original_expire() {
        let name = unique_name("foobar-extend");
        let pool = test_pool();
        let lock_key = format!("lock:{name}");

        let mut lock = Lock::builder(pool.clone(), &name)
            .expire(Duration::from_secs(100))
            .build()
            .unwrap();
        assert!(lock.acquire(false, None).await.unwrap());

        let mut conn = pool.get().await.unwrap();
        let ttl: i64 = conn.ttl(&lock_key).await.unwrap();
        assert!(ttl > 0 && ttl <= 100);

        lock.extend(Some(Duration::from_secs(1000))).await.unwrap();
        let ttl: i64 = conn.ttl(&lock_key).await.unwrap();
        assert!(ttl > 100);

        lock.release().await.unwrap();
    }

    /// §4.2: "May be called from either the handle's owner or any other
    /// client that possesses the same id" — grounded on upstream's
    /// `test_extend_another_instance`.
    #[tokio::test]
    async fn extend_succeeds_from_a_second_handle_sharing_the_same_id() {
        let name = unique_name("foobar-shared-id");
        let pool = test_pool();
        let lock_key = format!("lock:{name}");

        let mut lock = Lock::builder(pool.clone(), &name)
            .expire(Duration::from_secs(100))
            .build()
            .unwrap();
        assert!(lock.acquire(false, None).await.unwrap());

        let mut conn = pool.get().await.unwrap();
        let ttl: i64 = conn.ttl(&lock_key).await.unwrap();
        assert!(ttl > 0 && ttl <= 100);

        let another = Lock::builder(pool.clone(), &name)
            .id(LockId::from_text(lock.id().to_string()))
            .build()
            .unwrap();
        another.extend(Some(Duration::from_secs(1000))).await.unwrap();

        let ttl: i64 = conn.ttl(&lock_key).await.unwrap();
        assert!(ttl > 100);

        lock.release().await.unwrap();
    }

    /// Testable property 5: with `expire=3, auto_renewal=true`, after
    /// `2*expire` the lock key still exists and its value is still the
    /// holder's id.
    #[tokio::test]
    async fn auto_renewal_keeps_the_lease_alive() {
        let name = unique_name("renew-alive");
        let pool = test_pool();
        let expire = Duration::from_secs(3);

        let mut lock = Lock::builder(pool, &name)
            .expire(expire)
            .auto_renewal(Duration::from_secs(1))
            .build()
            .unwrap();
        assert!(lock.acquire(false, None).await.unwrap());

        tokio::time::sleep(expire * 2).await;

        assert!(lock.locked().await.unwrap(), "renewal should have kept the lease alive");
        assert_eq!(lock.get_owner_id().await.unwrap().as_deref(), Some(lock.id()));

        lock.release().await.unwrap();
    }

    /// Testable property 6: once the handle (and its `Arc`) is dropped, the
    /// renewal worker exits without re-extending, and the lock key expires
    /// naturally at its original lease.
    #[tokio::test]
    async fn renewal_worker_stops_when_the_handle_is_dropped() {
        let name = unique_name("renew-drop");
        let pool = test_pool();
        let lock_key = format!("lock:{name}");
        let expire = Duration::from_secs(2);

        let mut lock = Lock::builder(pool.clone(), &name)
            .expire(expire)
            .auto_renewal(Duration::from_millis(500))
            .build()
            .unwrap();
        assert!(lock.acquire(false, None).await.unwrap());

        drop(lock);

        // Wait past the original lease: if renewal kept running despite the
        // handle being dropped, the key would still be here.
        tokio::time::sleep(expire + Duration::from_secs(1)).await;

        let mut conn = pool.get().await.unwrap();
        let exists: bool = conn.exists(&lock_key).await.unwrap();
        assert!(!exists, "lock key should expire naturally once renewal stops");
    }

    /// Testable property 7: after release, the signal list still carries its
    /// wake token at 500ms but has self-expired by 1500ms.
    #[tokio::test]
    async fn signal_list_self_expires_after_release() {
        let name = unique_name("signal-expiry");
        let pool = test_pool();
        let signal_key = format!("lock-signal:{name}");

        let mut lock = Lock::builder(pool.clone(), &name)
            .expire(Duration::from_secs(30))
            .build()
            .unwrap();
        assert!(lock.acquire(false, None).await.unwrap());
        lock.release().await.unwrap();

        let mut conn = pool.get().await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let ttl: i64 = conn.ttl(&signal_key).await.unwrap();
        assert!(ttl > 0, "signal list should still carry its wake token at 500ms");

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let len: i64 = conn.llen(&signal_key).await.unwrap();
        assert_eq!(len, 0, "signal list should have self-expired by 1500ms");
    }

    #[tokio::test]
    async fn release_wakes_a_blocked_waiter_via_signal() {
        let name = unique_name("signal");
        let pool = test_pool();

        let mut holder = Lock::builder(pool.clone(), &name)
            .expire(Duration::from_secs(30))
            .build()
            .unwrap();
        assert!(holder.acquire(false, None).await.unwrap());

        let waiter_pool = pool.clone();
        let waiter_name = name.clone();
        let waiter = tokio::spawn(async move {
            let mut waiter = Lock::builder(waiter_pool, &waiter_name).build().unwrap();
            let acquired = waiter
                .acquire(true, Some(Duration::from_secs(10)))
                .await
                .unwrap();
            (waiter, acquired)
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        holder.release().await.unwrap();

        let (mut waiter, acquired) = waiter.await.unwrap();
        assert!(acquired, "waiter should wake on the release signal, not the timeout");
        waiter.release().await.unwrap();
    }

    #[tokio::test]
    async fn reset_clears_the_lock_regardless_of_owner() {
        let name = unique_name("reset");
        let pool = test_pool();

        let mut owner = Lock::builder(pool.clone(), &name).build().unwrap();
        assert!(owner.acquire(false, None).await.unwrap());

        let intruder = Lock::builder(pool, &name).build().unwrap();
        intruder.reset().await.unwrap();

        assert!(!owner.locked().await.unwrap());
    }

    #[tokio::test]
    async fn reset_all_clears_every_lock_in_the_keyspace() {
        let pool = test_pool();
        let name_a = unique_name("reset-all-a");
        let name_b = unique_name("reset-all-b");

        let mut a = Lock::builder(pool.clone(), &name_a).build().unwrap();
        let mut b = Lock::builder(pool.clone(), &name_b).build().unwrap();
        assert!(a.acquire(false, None).await.unwrap());
        assert!(b.acquire(false, None).await.unwrap());

        reset_all(&pool).await.unwrap();

        assert!(!a.locked().await.unwrap());
        assert!(!b.locked().await.unwrap());
    }

    #[tokio::test]
    async fn many_concurrent_clients_never_observe_double_ownership() {
        let name = unique_name("stampede");
        let pool = test_pool();
        let mut set = tokio::task::JoinSet::new();

        for _ in 0..125 {
            let pool = pool.clone();
            let name = name.clone();
            set.spawn(async move {
                let mut lock = Lock::builder(pool, &name)
                    .expire(Duration::from_secs(5))
                    .build()
                    .unwrap();
                let acquired = lock
                    .acquire(true, Some(Duration::from_secs(20)))
                    .await
                    .unwrap();
                assert!(acquired);
                tokio::time::sleep(Duration::from_millis(5)).await;
                lock.release().await.unwrap();
            });
        }

        while let Some(result) = set.join_next().await {
            result.expect("no task should panic or observe a held lock");
        }
    }
}
