//! C3 LockManager: short-lived execution locks with atomic per-loader and
//! global visibility, plus an in-process cancel-handle registry.
//!
//! The staleness check takes an injectable clock the way
//! `ReconcileFreshnessGuard<C: Fn() -> i64>` does, so tests can drive time
//! deterministically instead of sleeping past real thresholds.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use etl_types::EtlError;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Cooperative cancellation signal for the worker executing under a lock.
/// The worker is expected to poll `is_cancelled()` at safe checkpoints; this
/// does not preempt a running query.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct AcquiredLock {
    pub id: Uuid,
    pub loader_code: String,
    pub replica_name: String,
    pub acquired_at: DateTime<Utc>,
    pub cancel_handle: CancelHandle,
}

#[cfg(feature = "testkit")]
impl AcquiredLock {
    /// Builds a syntactically valid `AcquiredLock` with no database row and
    /// no entry in any `LockManager`'s registry. For tests that exercise
    /// `release`/handle-cancellation idempotency against a lock that was
    /// never actually acquired through `try_acquire`.
    pub fn for_test(loader_code: impl Into<String>, replica_name: impl Into<String>, acquired_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            loader_code: loader_code.into(),
            replica_name: replica_name.into(),
            acquired_at,
            cancel_handle: CancelHandle::new(),
        }
    }
}

struct RegisteredLock {
    acquired_at: DateTime<Utc>,
    handle: CancelHandle,
}

/// `GLOBAL_LIMIT` per §4.2 — the total number of non-released locks allowed
/// across every loader at once.
pub const GLOBAL_LIMIT: i64 = 100;

pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_RELEASED_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct LockManager<C>
where
    C: Fn() -> DateTime<Utc> + Send + Sync,
{
    pool: PgPool,
    clock: C,
    global_limit: i64,
    stale_threshold: Duration,
    released_retention: Duration,
    cancel_handles: RwLock<HashMap<Uuid, RegisteredLock>>,
}

pub type SystemLockManager = LockManager<fn() -> DateTime<Utc>>;

impl SystemLockManager {
    pub fn new_system(pool: PgPool) -> Self {
        LockManager::new(
            pool,
            Utc::now,
            GLOBAL_LIMIT,
            DEFAULT_STALE_THRESHOLD,
            DEFAULT_RELEASED_RETENTION,
        )
    }
}

impl<C> LockManager<C>
where
    C: Fn() -> DateTime<Utc> + Send + Sync,
{
    pub fn new(
        pool: PgPool,
        clock: C,
        global_limit: i64,
        stale_threshold: Duration,
        released_retention: Duration,
    ) -> Self {
        Self {
            pool,
            clock,
            global_limit,
            stale_threshold,
            released_retention,
            cancel_handles: RwLock::new(HashMap::new()),
        }
    }

    /// Succeeds iff `activeLocks(loaderCode) < maxParallelExecutions` and
    /// `totalActiveLocks < GLOBAL_LIMIT`, both checked and the insert applied
    /// within one transaction in `etl_db::try_acquire_lock`.
    pub async fn try_acquire(
        &self,
        loader_code: &str,
        replica_name: &str,
        max_parallel_executions: i32,
    ) -> Result<Option<AcquiredLock>, EtlError> {
        let lock_id = Uuid::new_v4();
        let row = etl_db::try_acquire_lock(
            &self.pool,
            lock_id,
            loader_code,
            replica_name,
            max_parallel_executions,
            self.global_limit,
        )
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let handle = CancelHandle::new();
        self.cancel_handles.write().await.insert(
            row.id,
            RegisteredLock {
                acquired_at: row.acquired_at,
                handle: handle.clone(),
            },
        );

        Ok(Some(AcquiredLock {
            id: row.id,
            loader_code: row.loader_code,
            replica_name: row.replica_name,
            acquired_at: row.acquired_at,
            cancel_handle: handle,
        }))
    }

    /// Releasing an already-released or unknown lock is a no-op that emits a
    /// warning, never an error.
    pub async fn release(&self, lock_id: Uuid) -> Result<(), EtlError> {
        let released = etl_db::release_lock(&self.pool, lock_id).await?;
        if !released {
            tracing::warn!(%lock_id, "release called on an already-released or unknown lock");
        }
        self.cancel_handles.write().await.remove(&lock_id);
        Ok(())
    }

    /// Marks released any lock held past `staleThreshold` and cancels this
    /// replica's execution handle for each one found in the local registry.
    /// Returns the count of rows the database marked released (which may
    /// include locks owned by other replicas — this replica only cancels
    /// handles it itself registered).
    pub async fn cleanup_stale(&self) -> Result<u64, EtlError> {
        let stale_before = (self.clock)()
            - ChronoDuration::from_std(self.stale_threshold).unwrap_or(ChronoDuration::zero());

        let affected = etl_db::cleanup_stale_locks(&self.pool, stale_before).await?;

        let mut registry = self.cancel_handles.write().await;
        let stale_ids: Vec<Uuid> = registry
            .iter()
            .filter(|(_, entry)| entry.acquired_at < stale_before)
            .map(|(id, _)| *id)
            .collect();
        for id in stale_ids {
            if let Some(entry) = registry.remove(&id) {
                tracing::warn!(lock_id = %id, "cancelling execution handle for stale lock");
                entry.handle.cancel();
            }
        }

        Ok(affected)
    }

    /// Retention job: physically deletes released locks older than
    /// `releasedRetention`. The only physical delete the control plane ever
    /// performs (§3).
    pub async fn delete_retained(&self) -> Result<u64, EtlError> {
        let retained_before = (self.clock)()
            - ChronoDuration::from_std(self.released_retention).unwrap_or(ChronoDuration::zero());
        Ok(etl_db::delete_retained_locks(&self.pool, retained_before).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl_testkit::FakeClock;

    fn lazy_pool() -> PgPool {
        PgPool::connect_lazy("postgres://localhost/does-not-matter").unwrap()
    }

    #[test]
    fn cancel_handle_starts_uncancelled_and_latches_true() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn cancel_handle_clones_share_the_same_flag() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled(), "cancelling a clone must be visible through the original");
    }

    #[tokio::test]
    async fn cleanup_stale_cancels_only_registered_handles_older_than_the_bound() {
        let now = FakeClock::starting_now();
        let manager = LockManager::new(
            lazy_pool(),
            now.as_fn(),
            GLOBAL_LIMIT,
            Duration::from_secs(60),
            DEFAULT_RELEASED_RETENTION,
        );

        let fresh_handle = CancelHandle::new();
        let stale_handle = CancelHandle::new();
        manager.cancel_handles.write().await.insert(
            Uuid::new_v4(),
            RegisteredLock {
                acquired_at: now.now(),
                handle: fresh_handle.clone(),
            },
        );
        manager.cancel_handles.write().await.insert(
            Uuid::new_v4(),
            RegisteredLock {
                acquired_at: now.now() - ChronoDuration::seconds(120),
                handle: stale_handle.clone(),
            },
        );

        // The actual DB round trip in cleanup_stale is exercised by the
        // DB-gated scenario tests; here we only check the in-process
        // cancellation bookkeeping, so we invoke the same filtering logic
        // directly rather than going through the pool.
        let stale_before = now.now() - ChronoDuration::seconds(60);
        let mut registry = manager.cancel_handles.write().await;
        let stale_ids: Vec<Uuid> = registry
            .iter()
            .filter(|(_, entry)| entry.acquired_at < stale_before)
            .map(|(id, _)| *id)
            .collect();
        for id in stale_ids {
            registry.remove(&id).unwrap().handle.cancel();
        }
        drop(registry);

        assert!(!fresh_handle.is_cancelled());
        assert!(stale_handle.is_cancelled());
    }
}
