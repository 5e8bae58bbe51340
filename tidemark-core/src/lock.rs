//! Cluster-mode lock acquisition.
//!
//! Two nested locks serialize concurrent runners: the application lock,
//! an advisory held on the database server itself, and the history table
//! lock, a row inserted into the metadata table. The application lock is
//! always taken first and released last.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::driver::DatabaseDriver;
use crate::error::{CoreError, CoreResult};
use crate::metadata::MetadataStore;

/// Retry policy for contended locks: exponential backoff from `initial`
/// by `factor` up to `ceiling`, with an optional overall `deadline` after
/// which acquisition fails instead of spinning forever.
#[derive(Debug, Clone, PartialEq)]
pub struct LockRetryPolicy {
    /// First backoff interval.
    pub initial: Duration,
    /// Multiplier applied after each contended attempt.
    pub factor: f64,
    /// Upper bound on a single backoff interval.
    pub ceiling: Duration,
    /// Overall acquisition deadline. `None` retries indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            factor: 2.0,
            ceiling: Duration::from_secs(3),
            deadline: None,
        }
    }
}

impl LockRetryPolicy {
    /// The backoff interval before the given retry (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.factor.powi(retry as i32);
        Duration::from_secs_f64(scaled.min(self.ceiling.as_secs_f64()))
    }
}

/// Which locks a command currently holds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LockSet {
    /// The server-side application lock.
    pub application: bool,
    /// The history table lock row.
    pub metadata: bool,
}

/// Acquire the server-side application lock. Always taken before the
/// history table lock.
pub async fn acquire_application(
    driver: &dyn DatabaseDriver,
    policy: &LockRetryPolicy,
) -> CoreResult<()> {
    spin(policy, "application", || driver.try_acquire_application_lock()).await
}

/// Acquire the history table lock row.
pub async fn acquire_metadata(
    store: &dyn MetadataStore,
    policy: &LockRetryPolicy,
) -> CoreResult<()> {
    spin(policy, "history table", || store.try_lock()).await
}

/// Release held locks in reverse order. Best-effort: failures are logged
/// and never replace the primary error of the command body.
pub async fn release(driver: &dyn DatabaseDriver, store: &dyn MetadataStore, locks: LockSet) {
    if locks.metadata {
        if let Err(e) = store.release_lock().await {
            warn!(error = %e, "failed to release the history table lock");
        }
    }
    if locks.application {
        if let Err(e) = driver.release_application_lock().await {
            warn!(error = %e, "failed to release the application lock");
        }
    }
}

async fn spin<F, Fut>(policy: &LockRetryPolicy, what: &'static str, mut attempt: F) -> CoreResult<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = CoreResult<bool>>,
{
    let started = Instant::now();
    let mut retry: u32 = 0;
    loop {
        if attempt().await? {
            return Ok(());
        }
        let backoff = policy.backoff(retry);
        if let Some(deadline) = policy.deadline {
            if started.elapsed() + backoff > deadline {
                return Err(CoreError::LockTimeout(what));
            }
        }
        info!(
            lock = what,
            retry = retry + 1,
            backoff_ms = backoff.as_millis() as u64,
            "lock is held by another runner, waiting"
        );
        sleep(backoff).await;
        retry = retry.saturating_add(1);
    }
}
