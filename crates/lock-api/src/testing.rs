use std::time::Duration;

use tokio::time::Instant;

use crate::error::LockError;
use crate::lock::LockHandle;

/// Run the distributed-lock conformance suite against a backend.
///
/// `make` builds a fresh, unheld handle for the given lock name; call it as
/// many times as needed to get independent handles contending on the same
/// name. Each test uses its own name so the suite can run unordered against
/// a shared backend.
///
/// Covers spec testable properties 1, 3, 4, 8, and 9. Properties 5, 6, and 7
/// (renewal timing, renewal-on-drop, and signal-list expiry) require direct
/// inspection of server-side TTLs and are exercised by each backend's own
/// integration tests instead, since this suite only sees the [`LockHandle`]
/// surface.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_lock_conformance_tests<F>(make: F) -> Result<(), LockError>
where
    F: Fn(&str) -> Box<dyn LockHandle>,
{
    test_mutual_exclusion(&make).await?;
    test_release_requires_ownership(&make).await?;
    test_extend_requires_ownership(&make).await?;
    test_extend_no_ttl_not_expirable(&make).await?;
    test_reset_wakes_waiter(&make).await?;
    test_timeout_budget(&make).await?;
    Ok(())
}

async fn test_mutual_exclusion<F>(make: &F) -> Result<(), LockError>
where
    F: Fn(&str) -> Box<dyn LockHandle>,
{
    let mut a = make("conformance-mutex");
    let mut b = make("conformance-mutex");

    assert!(
        a.acquire(true, None).await?,
        "first handle should acquire uncontested lock"
    );
    assert!(
        !b.acquire(false, None).await?,
        "second handle must not acquire while the first holds it"
    );

    a.release().await?;
    assert!(
        b.acquire(false, None).await?,
        "second handle should acquire once the first releases"
    );
    b.release().await?;
    Ok(())
}

async fn test_release_requires_ownership<F>(make: &F) -> Result<(), LockError>
where
    F: Fn(&str) -> Box<dyn LockHandle>,
{
    let mut owner = make("conformance-release-identity");
    let mut intruder = make("conformance-release-identity");

    owner.acquire(true, None).await?;
    let err = intruder.release().await.expect_err("non-owner release must fail");
    assert!(matches!(err, LockError::NotAcquired));

    assert!(
        owner.locked().await?,
        "lock key must still exist after a rejected foreign release"
    );
    owner.release().await?;
    Ok(())
}

async fn test_extend_requires_ownership<F>(make: &F) -> Result<(), LockError>
where
    F: Fn(&str) -> Box<dyn LockHandle>,
{
    let mut owner = make("conformance-extend-identity");
    let intruder = make("conformance-extend-identity");

    owner.acquire(true, None).await?;
    let err = intruder
        .extend(Some(Duration::from_secs(30)))
        .await
        .expect_err("non-owner extend must fail");
    assert!(matches!(err, LockError::NotAcquired));

    owner.release().await?;
    Ok(())
}

async fn test_extend_no_ttl_not_expirable<F>(make: &F) -> Result<(), LockError>
where
    F: Fn(&str) -> Box<dyn LockHandle>,
{
    let mut owner = make("conformance-extend-no-ttl");
    owner.acquire(true, None).await?;

    let err = owner
        .extend(Some(Duration::from_secs(10)))
        .await
        .expect_err("extending a lock with no TTL must fail");
    assert!(matches!(err, LockError::NotExpirable));

    owner.release().await?;
    Ok(())
}

async fn test_reset_wakes_waiter<F>(make: &F) -> Result<(), LockError>
where
    F: Fn(&str) -> Box<dyn LockHandle>,
{
    let mut holder = make("conformance-reset-wakes");
    let mut waiter = make("conformance-reset-wakes");

    holder.acquire(true, None).await?;

    let reset_target = make("conformance-reset-wakes");
    let wake = tokio::spawn(async move { reset_target.reset().await });

    let acquired = tokio::time::timeout(Duration::from_secs(2), waiter.acquire(true, None))
        .await
        .expect("waiter must be woken by reset within 2s")?;
    assert!(acquired, "waiter should acquire after reset wakes it");

    wake.await.expect("reset task should not panic")?;
    waiter.release().await?;
    Ok(())
}

async fn test_timeout_budget<F>(make: &F) -> Result<(), LockError>
where
    F: Fn(&str) -> Box<dyn LockHandle>,
{
    let mut holder = make("conformance-timeout-budget");
    let mut waiter = make("conformance-timeout-budget");

    holder.acquire(true, None).await?;

    let start = Instant::now();
    let acquired = waiter.acquire(true, Some(Duration::from_secs(1))).await?;
    let elapsed = start.elapsed();

    assert!(!acquired, "timed-out acquire must return false");
    assert!(
        elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(3),
        "acquire should return within ~1 round-trip of its timeout, took {elapsed:?}"
    );

    holder.release().await?;
    Ok(())
}
