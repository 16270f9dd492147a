//! The background renewal worker.
//!
//! One cooperative `tokio` task per auto-renewing handle (spec §4.3, §9:
//! "historic implementations used per-handle background tasks" — the
//! design kept here, over the later shared-pool consolidation, because the
//! `Arc`/`Weak` pair below implements the "weak back-reference" invariant
//! directly instead of needing a separate liveness map).
//!
//! The task holds only a [`Weak`] pointer to the handle's shared state.
//! Once the owning [`crate::handle::Lock`] is dropped, the last strong
//! [`Arc`] goes with it and the next `Weak::upgrade` in the loop fails,
//! ending the task — this is the Rust rendering of "renewal worker holds a
//! weak reference; its presence must not prevent the handle from being
//! collected" (spec §3 invariant 3, testable property 6).

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::handle::LockInner;
use crate::scripts::ExtendOutcome;

/// A running renewal task plus the handle needed to stop and join it.
pub struct RenewalWorker {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RenewalWorker {
    /// Spawn the renewal loop for `inner`, re-extending the lease every
    /// `interval` until stopped, dropped, or the lease is lost.
    pub fn spawn(inner: &std::sync::Arc<LockInner>, interval: Duration) -> Self {
        let weak: Weak<LockInner> = std::sync::Arc::downgrade(inner);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let lock_name = inner.name.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        tracing::debug!(lock = %lock_name, "renewal worker signalled to stop");
                        break;
                    }
                    () = tokio::time::sleep(interval) => {}
                }

                let Some(inner) = weak.upgrade() else {
                    tracing::debug!(lock = %lock_name, "renewal worker exiting: handle was dropped");
                    break;
                };

                tracing::debug!(lock = %lock_name, "refreshing lease");
                match inner.extend_self().await {
                    Ok(ExtendOutcome::Extended) => {}
                    Ok(ExtendOutcome::NotOwner) => {
                        tracing::debug!(lock = %lock_name, "renewal worker exiting: lease was lost");
                        break;
                    }
                    Ok(ExtendOutcome::NoExpiry) => {
                        tracing::warn!(lock = %lock_name, "renewal worker exiting: lock has no TTL");
                        break;
                    }
                    Err(error) => {
                        tracing::warn!(lock = %lock_name, %error, "renewal worker exiting after extend error");
                        break;
                    }
                }
            }
            tracing::debug!(lock = %lock_name, "renewal worker exited");
        });

        Self {
            stop: Some(stop_tx),
            task,
        }
    }

    /// Signal the worker to stop and wait for it to exit. Synchronous with
    /// respect to the caller: no further renewal traffic can be in flight
    /// once this returns (spec §4.3 "joining ... is a synchronous
    /// operation").
    pub async fn stop_and_join(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.task.await;
    }
}
