//! C8 BackfillService: on-demand time-range reloads. `submit`/`execute`/
//! `cancel` mirror the PENDING → RUNNING → SUCCESS/FAILED/CANCELLED lifecycle
//! `load_history` already uses for scheduled runs, but here the caller drives
//! `execute` explicitly instead of C5 dispatching it.

use chrono::{DateTime, Utc};
use etl_db::BackfillJobRow;
use etl_pipeline::{ExecutionPipeline, TimeWindow};
use etl_types::EtlError;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PURGE_STRATEGY: &str = "PURGE_AND_RELOAD";

pub struct BackfillService<C>
where
    C: Fn() -> DateTime<Utc> + Send + Sync,
{
    pool: PgPool,
    pipeline: Arc<ExecutionPipeline>,
    clock: C,
    replica_name: String,
}

pub type SystemBackfillService = BackfillService<fn() -> DateTime<Utc>>;

impl SystemBackfillService {
    pub fn new_system(pool: PgPool, pipeline: Arc<ExecutionPipeline>, replica_name: String) -> Self {
        BackfillService::new(pool, pipeline, Utc::now, replica_name)
    }
}

impl<C> BackfillService<C>
where
    C: Fn() -> DateTime<Utc> + Send + Sync,
{
    pub fn new(pool: PgPool, pipeline: Arc<ExecutionPipeline>, clock: C, replica_name: String) -> Self {
        Self {
            pool,
            pipeline,
            clock,
            replica_name,
        }
    }

    /// Requires the loader to exist and `fromTime < toTime`; lands the job
    /// `PENDING`. Defaults `purgeStrategy` to `PURGE_AND_RELOAD`.
    pub async fn submit(
        &self,
        loader_code: &str,
        from_time: DateTime<Utc>,
        to_time: DateTime<Utc>,
        purge_strategy: Option<&str>,
        requested_by: &str,
    ) -> Result<Uuid, EtlError> {
        self.submit_with_gap_kind(loader_code, from_time, to_time, purge_strategy, requested_by, None)
            .await
    }

    /// Same as `submit`, plus an optional `gap_kind` tag — only the gap
    /// scanner passes one, to persist which detector produced the job.
    pub(crate) async fn submit_with_gap_kind(
        &self,
        loader_code: &str,
        from_time: DateTime<Utc>,
        to_time: DateTime<Utc>,
        purge_strategy: Option<&str>,
        requested_by: &str,
        gap_kind: Option<&str>,
    ) -> Result<Uuid, EtlError> {
        if from_time >= to_time {
            return Err(EtlError::Validation(format!(
                "backfill window must satisfy fromTime < toTime, got {from_time} >= {to_time}"
            )));
        }
        etl_db::get_active_loader(&self.pool, loader_code)
            .await?
            .ok_or_else(|| EtlError::NotFound(format!("loader {loader_code} not found")))?;

        let strategy = purge_strategy.unwrap_or(DEFAULT_PURGE_STRATEGY);
        let job_id = Uuid::new_v4();
        etl_db::insert_backfill_job(&self.pool, job_id, loader_code, from_time, to_time, strategy, requested_by, gap_kind)
            .await?;

        tracing::info!(job_id = %job_id, loader_code, requested_by, "backfill/submit");
        Ok(job_id)
    }

    /// `PENDING` → `RUNNING` → `SUCCESS`/`FAILED`, invoking C4 over the job's
    /// explicit window. The loader row is cloned with `purge_strategy`
    /// overridden to the job's own value — a backfill may reprocess under a
    /// different strategy than the loader's configured default, and
    /// `ExecutionPipeline::execute` reads the strategy off the `LoaderRow`
    /// it's given rather than taking a separate parameter.
    pub async fn execute(&self, job_id: Uuid) -> Result<BackfillJobRow, EtlError> {
        let job = self.get(job_id).await?;

        let mut loader = etl_db::get_active_loader(&self.pool, &job.loader_code)
            .await?
            .ok_or_else(|| EtlError::NotFound(format!("loader {} not found", job.loader_code)))?;
        loader.purge_strategy = job.purge_strategy.clone();

        let started_at = (self.clock)();
        let started = etl_db::start_backfill_job(&self.pool, job_id, &self.replica_name, started_at).await?;
        if !started {
            return Err(EtlError::IllegalState(format!("backfill job {job_id} is not PENDING")));
        }

        let window = TimeWindow {
            from_time: job.window_start,
            to_time: job.window_end,
        };
        let requested_by = format!("BACKFILL_{job_id}");

        match self.pipeline.run(&loader, window, Some(&requested_by)).await {
            Ok(outcome) => {
                let status = if outcome.status == "FAILED" { "FAILED" } else { "SUCCESS" };
                etl_db::complete_backfill_job(
                    &self.pool,
                    job_id,
                    status,
                    Some(outcome.records_ingested as i32),
                    Some(outcome.records_purged as i32),
                    outcome.error_message.as_deref(),
                )
                .await?;
            }
            Err(e) => {
                etl_db::complete_backfill_job(&self.pool, job_id, "FAILED", None, None, Some(&e.to_string())).await?;
            }
        }

        tracing::info!(job_id = %job_id, loader_code = %job.loader_code, "backfill/execute-complete");
        self.get(job_id).await
    }

    /// Allowed only while still `PENDING`.
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), EtlError> {
        let cancelled = etl_db::cancel_backfill_job(&self.pool, job_id).await?;
        if !cancelled {
            return Err(EtlError::IllegalState(format!("backfill job {job_id} is not PENDING")));
        }
        tracing::info!(job_id = %job_id, "backfill/cancel");
        Ok(())
    }

    pub async fn get(&self, job_id: Uuid) -> Result<BackfillJobRow, EtlError> {
        etl_db::get_backfill_job(&self.pool, job_id)
            .await?
            .ok_or_else(|| EtlError::NotFound(format!("backfill job {job_id} not found")))
    }

    pub async fn list_for_loader(&self, loader_code: &str) -> Result<Vec<BackfillJobRow>, EtlError> {
        Ok(etl_db::list_backfill_jobs(&self.pool, loader_code).await?)
    }
}

/// `durationSeconds = endTime − startTime` (§4.6). Not a stored column —
/// `started_at`/`finished_at` are the source of truth, the same way
/// `LoadHistory` stores no duration and leaves callers to derive it.
pub fn duration_seconds(job: &BackfillJobRow) -> Option<i64> {
    match (job.started_at, job.finished_at) {
        (Some(start), Some(end)) => Some((end - start).num_seconds()),
        _ => None,
    }
}
