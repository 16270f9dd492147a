use thiserror::Error;

/// Errors from distributed lock operations.
///
/// Identity-check failures (`NotAcquired`, `NotExpirable`) are never
/// recovered locally — they always surface to the caller. Transport hiccups
/// are retried once by the script registry before becoming [`Self::Backend`]
/// or [`Self::Connection`].
#[derive(Debug, Error)]
pub enum LockError {
    /// `acquire` called on a handle that is already held.
    #[error("lock already acquired from this handle")]
    AlreadyAcquired,

    /// `release` or `extend` where the stored owner differs from the
    /// caller's id, or the lock key is absent.
    #[error("lock not acquired, or it already expired")]
    NotAcquired,

    /// `extend` called on a lock key that exists without a TTL.
    #[error("lock has no assigned expiration time")]
    NotExpirable,

    /// A non-positive timeout was supplied to `acquire`.
    #[error("invalid timeout: {0}")]
    InvalidTimeout(i64),

    /// A timeout was supplied with `blocking = false`.
    #[error("timeout cannot be used with blocking = false")]
    TimeoutNotUsable,

    /// `timeout` exceeds `expire` and auto-renewal is not enabled.
    #[error("timeout ({timeout}s) cannot be greater than expire ({expire}s)")]
    TimeoutTooLarge { timeout: u64, expire: u64 },

    /// The renewal worker was started twice on the same handle.
    #[error("renewal worker already started")]
    AlreadyStarted,

    /// A handle was built, or an operation was called, with a combination of
    /// options that can never succeed (e.g. `auto_renewal` without `expire`).
    #[error("invalid lock configuration: {0}")]
    InvalidConfig(&'static str),

    /// A Lua script returned a code the caller does not know how to
    /// interpret; indicates a version mismatch between the handle and the
    /// server-side program.
    #[error("unexpected return code {0} from {1} script")]
    ProtocolViolation(i64, &'static str),

    /// Failed to obtain a pooled connection.
    #[error("failed to acquire a pooled connection: {0}")]
    Connection(String),

    /// A Redis command failed after the registry's single retry.
    #[error("redis backend error: {0}")]
    Backend(#[from] redis::RedisError),
}
