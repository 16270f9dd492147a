//! The lock handle: construction, acquisition, and the operations that
//! require ownership of the stored identity.
//!
//! Key naming is fixed: a lock named `foo` lives at `lock:foo`, with its
//! wakeup list at `lock-signal:foo` (derived once, at construction, and
//! cached on [`LockInner`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use dlock_api::{LockError, LockHandle};

use crate::id::LockId;
use crate::renewal::RenewalWorker;
use crate::scripts::{ExtendOutcome, ScriptRegistry, UnlockOutcome};
use crate::signal;

/// State shared between a [`Lock`] and its renewal task, if one is running.
///
/// Holding this behind an `Arc` is what lets [`RenewalWorker`] keep only a
/// [`std::sync::Weak`] reference (see [`crate::renewal`]): the worker must
/// never be the thing keeping a handle's state alive.
pub struct LockInner {
    pool: Pool,
    registry: ScriptRegistry,
    name: String,
    lock_key: String,
    signal_key: String,
    id: LockId,
    expire: Option<Duration>,
    signal_expire: Duration,
}

impl LockInner {
    /// Re-extend using the handle's own configured expiry. Shared by the
    /// public `extend(None)` path and the renewal worker's periodic tick.
    pub(crate) async fn extend_self(&self) -> Result<ExtendOutcome, LockError> {
        let Some(expire) = self.expire else {
            return Ok(ExtendOutcome::NoExpiry);
        };
        self.registry
            .extend(
                &self.pool,
                &self.lock_key,
                self.id.as_str(),
                i64::try_from(expire.as_secs()).unwrap_or(i64::MAX),
            )
            .await
    }
}

/// A single named distributed lock.
///
/// Constructed via [`LockBuilder`]. A handle with an explicit id (rather
/// than a freshly generated one) is *not* implicitly held — it still must
/// go through [`Lock::acquire`] like any other handle. The Python
/// implementation this was adapted from instead re-derives "held" on every
/// check by asking the server whether the stored value equals `self.id`,
/// which makes an explicitly-id'd handle for an id that already owns the
/// key appear held without ever calling `acquire`. That ambiguity isn't
/// carried over here: `held` is a local flag, set only by a successful
/// `acquire` and cleared only by `release`, so the handle's notion of
/// "held" can never silently diverge from the calls it has actually made.
pub struct Lock {
    inner: Arc<LockInner>,
    held: bool,
    auto_renewal: bool,
    renewal_interval: Duration,
    renewal: Option<RenewalWorker>,
}

/// Builds a [`Lock`], validating the combination of options up front rather
/// than deferring to the first failed operation.
pub struct LockBuilder {
    pool: Pool,
    registry: ScriptRegistry,
    name: String,
    id: Option<LockId>,
    expire: Option<Duration>,
    signal_expire: Duration,
    auto_renewal: bool,
    renewal_interval: Option<Duration>,
}

impl LockBuilder {
    #[must_use]
    pub fn new(pool: Pool, name: impl Into<String>) -> Self {
        Self {
            pool,
            registry: ScriptRegistry::new(),
            name: name.into(),
            id: None,
            expire: None,
            signal_expire: Duration::from_secs(1),
            auto_renewal: false,
            renewal_interval: None,
        }
    }

    /// Use a caller-supplied registry instead of building a fresh one —
    /// lets a process share compiled scripts across many locks.
    #[must_use]
    pub fn registry(mut self, registry: ScriptRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Adopt an explicit identity instead of generating a random one. Used
    /// to resume ownership of a lock acquired by a previous process.
    #[must_use]
    pub fn id(mut self, id: LockId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the lock key's TTL once acquired. Leave unset and the key never
    /// expires on its own.
    #[must_use]
    pub fn expire(mut self, expire: Duration) -> Self {
        self.expire = Some(expire);
        self
    }

    /// How long the wakeup signal list lives for after a release or reset.
    /// Defaults to one second, matching upstream.
    #[must_use]
    pub fn signal_expire(mut self, signal_expire: Duration) -> Self {
        self.signal_expire = signal_expire;
        self
    }

    /// Start a background task that re-extends the lease at `interval`
    /// while the lock is held, so callers don't need to call
    /// [`Lock::extend`] themselves. Requires `expire` to be set.
    #[must_use]
    pub fn auto_renewal(mut self, interval: Duration) -> Self {
        self.auto_renewal = true;
        self.renewal_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<Lock, LockError> {
        if self.auto_renewal && self.expire.is_none() {
            return Err(LockError::InvalidConfig(
                "auto_renewal requires expire to be set",
            ));
        }
        if self.expire == Some(Duration::ZERO) {
            return Err(LockError::InvalidConfig("expire must be positive when set"));
        }
        if self.signal_expire.is_zero() {
            return Err(LockError::InvalidConfig("signal_expire must be positive"));
        }

        let lock_key = format!("lock:{}", self.name);
        let signal_key = signal::signal_key(&self.name);
        let inner = Arc::new(LockInner {
            pool: self.pool,
            registry: self.registry,
            name: self.name,
            lock_key,
            signal_key,
            id: self.id.unwrap_or_else(LockId::generate),
            expire: self.expire,
            signal_expire: self.signal_expire,
        });

        Ok(Lock {
            inner,
            held: false,
            auto_renewal: self.auto_renewal,
            renewal_interval: self.renewal_interval.unwrap_or_default(),
            renewal: None,
        })
    }
}

impl Lock {
    #[must_use]
    pub fn builder(pool: Pool, name: impl Into<String>) -> LockBuilder {
        LockBuilder::new(pool, name)
    }

    /// `SET lock:<name> <id> NX [EX <expire>]`. Returns whether the key was
    /// set, i.e. whether no one else currently holds the lock.
    async fn try_set(&self) -> Result<bool, LockError> {
        let mut conn = self
            .inner
            .pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(&self.inner.lock_key)
            .arg(self.inner.id.as_str())
            .arg("NX");
        if let Some(expire) = self.inner.expire {
            cmd.arg("EX").arg(expire.as_secs());
        }

        let result: Option<String> = cmd.query_async(&mut conn).await.map_err(LockError::Backend)?;
        Ok(result.is_some())
    }
}

#[async_trait]
impl LockHandle for Lock {
    async fn acquire(
        &mut self,
        blocking: bool,
        timeout: Option<Duration>,
    ) -> Result<bool, LockError> {
        if self.held {
            return Err(LockError::AlreadyAcquired);
        }
        if !blocking && timeout.is_some() {
            return Err(LockError::TimeoutNotUsable);
        }
        if let Some(timeout) = timeout {
            if timeout.is_zero() {
                return Err(LockError::InvalidTimeout(0));
            }
            if let Some(expire) = self.inner.expire {
                if !self.auto_renewal && timeout > expire {
                    return Err(LockError::TimeoutTooLarge {
                        timeout: timeout.as_secs(),
                        expire: expire.as_secs(),
                    });
                }
            }
        }

        tracing::debug!(lock = %self.inner.name, blocking, "acquiring lock");
        // An explicit timeout always wins; absent one, block for at most the
        // lock's own TTL so a crashed holder's key expiring is itself enough
        // to wake us. `None` on both sides blocks forever.
        let blpop_timeout = timeout.or(self.inner.expire);
        let mut timed_out = false;

        loop {
            if self.try_set().await? {
                self.held = true;
                if self.auto_renewal {
                    self.renewal = Some(RenewalWorker::spawn(&self.inner, self.renewal_interval));
                }
                tracing::info!(lock = %self.inner.name, "acquired lock");
                return Ok(true);
            }

            if timed_out || !blocking {
                tracing::debug!(lock = %self.inner.name, "failed to acquire lock");
                return Ok(false);
            }

            let mut conn = self
                .inner
                .pool
                .get()
                .await
                .map_err(|e| LockError::Connection(e.to_string()))?;
            let popped =
                signal::wait_for_wake(&mut conn, &self.inner.signal_key, blpop_timeout).await?;
            // The signal is only a hint, regardless of which branch fired
            // above: always loop back and retry SET NX. Only an explicit
            // timeout expiring without a wakeup ends the loop.
            if !popped && timeout.is_some() {
                timed_out = true;
            }
        }
    }

    async fn release(&mut self) -> Result<(), LockError> {
        if let Some(worker) = self.renewal.take() {
            worker.stop_and_join().await;
        }
        tracing::debug!(lock = %self.inner.name, "releasing lock");

        let outcome = self
            .inner
            .registry
            .unlock(
                &self.inner.pool,
                &self.inner.lock_key,
                &self.inner.signal_key,
                self.inner.id.as_str(),
                i64::try_from(self.inner.signal_expire.as_millis()).unwrap_or(i64::MAX),
            )
            .await?;
        self.held = false;

        match outcome {
            UnlockOutcome::Released => Ok(()),
            UnlockOutcome::NotOwner => Err(LockError::NotAcquired),
        }
    }

    async fn extend(&self, expire: Option<Duration>) -> Result<(), LockError> {
        let expire = match expire.or(self.inner.expire) {
            Some(expire) if expire.is_zero() => {
                return Err(LockError::InvalidConfig("expire must be positive"));
            }
            Some(expire) => expire,
            None => return Err(LockError::NotExpirable),
        };

        match self
            .inner
            .registry
            .extend(
                &self.inner.pool,
                &self.inner.lock_key,
                self.inner.id.as_str(),
                i64::try_from(expire.as_secs()).unwrap_or(i64::MAX),
            )
            .await?
        {
            ExtendOutcome::Extended => Ok(()),
            ExtendOutcome::NotOwner => Err(LockError::NotAcquired),
            ExtendOutcome::NoExpiry => Err(LockError::NotExpirable),
        }
    }

    async fn reset(&self) -> Result<(), LockError> {
        self.inner
            .registry
            .reset(
                &self.inner.pool,
                &self.inner.lock_key,
                &self.inner.signal_key,
                i64::try_from(self.inner.signal_expire.as_millis()).unwrap_or(i64::MAX),
            )
            .await
    }

    async fn get_owner_id(&self) -> Result<Option<String>, LockError> {
        let mut conn = self
            .inner
            .pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;
        use redis::AsyncCommands as _;
        conn.get(&self.inner.lock_key).await.map_err(LockError::Backend)
    }

    async fn locked(&self) -> Result<bool, LockError> {
        let mut conn = self
            .inner
            .pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;
        use redis::AsyncCommands as _;
        conn.exists(&self.inner.lock_key).await.map_err(LockError::Backend)
    }

    fn id(&self) -> &str {
        self.inner.id.as_str()
    }
}
