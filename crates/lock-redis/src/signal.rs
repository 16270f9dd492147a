//! The blocking-wait wakeup channel.
//!
//! `lock-signal:<name>` is an edge-triggered hint, never an ownership
//! channel (spec §4.4, §9 "Blocking-wait channel"). `BLPOP` unblocking,
//! the effective timeout elapsing, or a `reset`/`reset_all` racing in all
//! lead to the same retry: attempt `SET NX` again. Callers must never
//! inspect the popped element.

use std::time::Duration;

use deadpool_redis::Connection;
use dlock_api::LockError;
use redis::AsyncCommands;

/// Derive the signal list key for a lock name (already prefixed with
/// `lock:`, i.e. pass the bare user-supplied name here, not the lock key).
#[must_use]
pub fn signal_key(name: &str) -> String {
    format!("lock-signal:{name}")
}

/// Block on the signal list for up to `timeout`. `None` waits forever
/// (Redis `BLPOP` timeout `0`). Returns `true` if an element was popped,
/// `false` on timeout. The return value is a hint only — callers always
/// retry `SET NX` regardless of which branch was taken.
pub async fn wait_for_wake(
    conn: &mut Connection,
    signal_key: &str,
    timeout: Option<Duration>,
) -> Result<bool, LockError> {
    let timeout_secs = timeout.map_or(0.0, |d| d.as_secs_f64());
    let popped: Option<(String, String)> = conn
        .blpop(signal_key, timeout_secs)
        .await
        .map_err(LockError::Backend)?;
    Ok(popped.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_key_is_prefixed() {
        assert_eq!(signal_key("foobar"), "lock-signal:foobar");
    }
}
