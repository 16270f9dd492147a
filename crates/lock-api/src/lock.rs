use std::time::Duration;

use async_trait::async_trait;

use crate::error::LockError;

/// A single named distributed lock handle.
///
/// Mirrors the state machine in spec §4.2: `Unheld -> Held` on successful
/// [`acquire`](Self::acquire), back to `Unheld` on [`release`](Self::release)
/// or on any handle's [`reset`](Self::reset). A handle must not be shared
/// across threads/tasks without external synchronization (spec §5).
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// Attempt to acquire the lock.
    ///
    /// `blocking = false` with `timeout = Some(_)` is a caller error
    /// ([`LockError::TimeoutNotUsable`]). Returns `Ok(true)` once the lock
    /// is held, `Ok(false)` if a non-blocking attempt failed or a blocking
    /// attempt's timeout budget was spent.
    async fn acquire(
        &mut self,
        blocking: bool,
        timeout: Option<Duration>,
    ) -> Result<bool, LockError>;

    /// Release the lock. Fails with [`LockError::NotAcquired`] if this
    /// handle's id no longer owns the lock key.
    async fn release(&mut self) -> Result<(), LockError>;

    /// Extend the lock's TTL. `None` reuses the handle's configured expiry.
    async fn extend(&self, expire: Option<Duration>) -> Result<(), LockError>;

    /// Unconditionally clear the lock and wake any waiters. Used for crash
    /// recovery; bypasses the identity check by design.
    async fn reset(&self) -> Result<(), LockError>;

    /// The identifier currently stored under the lock key, if any.
    async fn get_owner_id(&self) -> Result<Option<String>, LockError>;

    /// Whether the lock key exists, regardless of owner.
    async fn locked(&self) -> Result<bool, LockError>;

    /// This handle's own identifier.
    fn id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify object safety.
    fn _assert_dyn_lock_handle(_: &dyn LockHandle) {}
}
