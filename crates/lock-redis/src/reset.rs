//! Crash recovery across every lock in a keyspace, not just one.
//!
//! For a single named lock, use [`crate::Lock::reset`]. This is the
//! free-function equivalent upstream exposes as a module-level
//! `reset_all()`, meant for a deployment's startup path after a deploy or a
//! crash where the previous process may have left lock keys behind.

use std::sync::OnceLock;

use deadpool_redis::Pool;
use dlock_api::LockError;

use crate::scripts::ScriptRegistry;

/// The `RESET_ALL` script is compiled once per process rather than per
/// call, mirroring upstream's module-level `reset_all_script` guard.
fn registry() -> &'static ScriptRegistry {
    static REGISTRY: OnceLock<ScriptRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ScriptRegistry::new)
}

/// Unconditionally clear every `lock:*` key and wake its waiters.
///
/// Returns the number of locks cleared. Scans the whole keyspace in one Lua
/// call, so this should only be run against a keyspace dedicated to, or at
/// least not contended by, this lock implementation.
pub async fn reset_all(pool: &Pool) -> Result<u64, LockError> {
    registry().reset_all(pool).await
}
