//! C5 LoaderScheduler: a single periodic tick that rate-limits stale-lock
//! cleanup, fetches eligible loaders, shuffles across them so no loader
//! starves, and dispatches every due one to a bounded worker pool — grounded
//! on `mqk-daemon::state::spawn_heartbeat`'s `tokio::time::interval` +
//! `tokio::spawn` shape, generalized from one heartbeat message to many
//! concurrent loader executions.

mod eligibility;

pub use eligibility::{is_due, AUTO_RECOVERY_THRESHOLD};

use chrono::{DateTime, Utc};
use etl_lock::LockManager;
use etl_pipeline::{select_window, ExecutionPipeline};
use etl_types::EtlError;
use rand::seq::SliceRandom;
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Semaphore;

pub const DEFAULT_POLLING_INTERVAL: StdDuration = StdDuration::from_secs(1);
pub const DEFAULT_STALE_LOCK_CLEANUP_INTERVAL: StdDuration = StdDuration::from_secs(60 * 60);

pub struct LoaderScheduler<C, CL>
where
    C: Fn() -> DateTime<Utc> + Send + Sync,
    CL: Fn() -> DateTime<Utc> + Send + Sync,
{
    pool: PgPool,
    lock_manager: Arc<LockManager<CL>>,
    pipeline: Arc<ExecutionPipeline>,
    clock: C,
    replica_name: String,
    worker_slots: Arc<Semaphore>,
    stale_cleanup_interval: StdDuration,
    last_stale_cleanup_epoch_ms: AtomicI64,
}

pub type SystemLoaderScheduler = LoaderScheduler<fn() -> DateTime<Utc>, fn() -> DateTime<Utc>>;

impl SystemLoaderScheduler {
    pub fn new_system(
        pool: PgPool,
        lock_manager: Arc<etl_lock::SystemLockManager>,
        pipeline: Arc<ExecutionPipeline>,
        replica_name: String,
        worker_pool_size: usize,
    ) -> Self {
        LoaderScheduler::new(
            pool,
            lock_manager,
            pipeline,
            Utc::now,
            replica_name,
            worker_pool_size,
            DEFAULT_STALE_LOCK_CLEANUP_INTERVAL,
        )
    }
}

impl<C, CL> LoaderScheduler<C, CL>
where
    C: Fn() -> DateTime<Utc> + Send + Sync,
    CL: Fn() -> DateTime<Utc> + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        lock_manager: Arc<LockManager<CL>>,
        pipeline: Arc<ExecutionPipeline>,
        clock: C,
        replica_name: String,
        worker_pool_size: usize,
        stale_cleanup_interval: StdDuration,
    ) -> Self {
        Self {
            pool,
            lock_manager,
            pipeline,
            clock,
            replica_name,
            worker_slots: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            stale_cleanup_interval,
            last_stale_cleanup_epoch_ms: AtomicI64::new(0),
        }
    }

    /// One scheduler tick (§4.4): stale-lock cleanup at most once per
    /// `stale_cleanup_interval`, fetch eligible loaders, shuffle, dispatch
    /// every due one whose lock acquisition and worker-slot acquisition both
    /// succeed. Returns the number of executions dispatched — each runs on
    /// the worker pool and is not awaited here.
    pub async fn tick(self: &Arc<Self>) -> Result<usize, EtlError>
    where
        C: 'static,
    {
        self.maybe_cleanup_stale().await?;

        let mut loaders = etl_db::list_enabled_loaders(&self.pool).await?;
        loaders.shuffle(&mut rand::thread_rng());

        let now = (self.clock)();
        let mut dispatched = 0usize;

        for loader in loaders {
            if !is_due(&loader, now) {
                continue;
            }
            let Some(window) =
                select_window(loader.last_load_timestamp, now, loader.min_interval_seconds, loader.max_query_period_seconds)
            else {
                continue;
            };

            let Ok(permit) = Arc::clone(&self.worker_slots).try_acquire_owned() else {
                // Worker pool is saturated this tick; this loader is retried
                // on the next one rather than blocking the tick to wait.
                continue;
            };

            let Some(lock) = self
                .lock_manager
                .try_acquire(&loader.loader_code, &self.replica_name, loader.max_parallel_executions)
                .await?
            else {
                drop(permit);
                continue;
            };

            dispatched += 1;
            let scheduler = Arc::clone(self);
            let lock_id = lock.id;
            tokio::spawn(async move {
                // `permit` is held for the lifetime of this task, bounding
                // in-process concurrency to `worker_pool_size` regardless of
                // how many loaders are due.
                let _permit = permit;

                // Guaranteed-exit scope (§4.4): the lock is released whether
                // the run succeeds, fails, or the cancel handle fired mid-run
                // — `pipeline.run` already records the outcome in history, so
                // this is purely about not leaking the lock.
                let run_result = scheduler.pipeline.run(&loader, window, Some(&scheduler.replica_name)).await;
                if let Err(e) = scheduler.lock_manager.release(lock_id).await {
                    tracing::error!(loader_code = %loader.loader_code, error = %e, "scheduler/release-failed");
                }
                if let Err(e) = run_result {
                    tracing::warn!(loader_code = %loader.loader_code, error = %e, "scheduler/execution-failed");
                }
            });
        }

        Ok(dispatched)
    }

    async fn maybe_cleanup_stale(&self) -> Result<(), EtlError> {
        let now = (self.clock)();
        let last = self.last_stale_cleanup_epoch_ms.load(Ordering::SeqCst);
        let due = now.timestamp_millis() - last >= self.stale_cleanup_interval.as_millis() as i64;
        if !due {
            return Ok(());
        }

        let released = self.lock_manager.cleanup_stale().await?;
        self.last_stale_cleanup_epoch_ms.store(now.timestamp_millis(), Ordering::SeqCst);
        if released > 0 {
            tracing::info!(released, "scheduler/stale-locks-cleaned");
        }
        Ok(())
    }

    /// Spawns the periodic tick as a background task, mirroring
    /// `mqk-daemon::state::spawn_heartbeat`'s `tokio::time::interval` loop.
    pub fn spawn_periodic(self: Arc<Self>, interval: StdDuration) -> tokio::task::JoinHandle<()>
    where
        C: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.tick().await {
                    tracing::error!(error = %e, "scheduler/tick-failed");
                }
            }
        })
    }
}
