use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BackfillJobRow {
    pub id: Uuid,
    pub loader_code: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub purge_strategy: String,
    pub status: String,
    pub requested_by: String,
    pub gap_kind: Option<String>,
    pub replica_name: Option<String>,
    pub record_count: Option<i32>,
    pub records_purged: Option<i32>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

const BACKFILL_COLUMNS: &str = r#"
    id, loader_code, window_start, window_end, purge_strategy, status, requested_by,
    gap_kind, replica_name, record_count, records_purged, error_message, started_at, finished_at
"#;

/// C8 `submit`: always lands `PENDING`; `execute` is a separate call.
#[allow(clippy::too_many_arguments)]
pub async fn insert_backfill_job(
    pool: &PgPool,
    id: Uuid,
    loader_code: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    purge_strategy: &str,
    requested_by: &str,
    gap_kind: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO backfill_jobs (id, loader_code, window_start, window_end, purge_strategy, status, requested_by, gap_kind)
        VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7)
        "#,
    )
    .bind(id)
    .bind(loader_code)
    .bind(window_start)
    .bind(window_end)
    .bind(purge_strategy)
    .bind(requested_by)
    .bind(gap_kind)
    .execute(pool)
    .await
    .context("insert_backfill_job failed")?;
    Ok(())
}

pub async fn get_backfill_job(pool: &PgPool, id: Uuid) -> Result<Option<BackfillJobRow>> {
    sqlx::query_as::<_, BackfillJobRow>(&format!("SELECT {BACKFILL_COLUMNS} FROM backfill_jobs WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("get_backfill_job failed")
}

pub async fn list_backfill_jobs(pool: &PgPool, loader_code: &str) -> Result<Vec<BackfillJobRow>> {
    sqlx::query_as::<_, BackfillJobRow>(&format!(
        "SELECT {BACKFILL_COLUMNS} FROM backfill_jobs WHERE loader_code = $1 ORDER BY created_at DESC"
    ))
    .bind(loader_code)
    .fetch_all(pool)
    .await
    .context("list_backfill_jobs failed")
}

pub async fn list_backfill_jobs_by_status(pool: &PgPool, status: &str) -> Result<Vec<BackfillJobRow>> {
    sqlx::query_as::<_, BackfillJobRow>(&format!(
        "SELECT {BACKFILL_COLUMNS} FROM backfill_jobs WHERE status = $1 ORDER BY created_at"
    ))
    .bind(status)
    .fetch_all(pool)
    .await
    .context("list_backfill_jobs_by_status failed")
}

/// §4.6's "> 5 active jobs per loader" cap counts `PENDING`/`RUNNING` rows.
pub async fn count_active_backfill_jobs(pool: &PgPool, loader_code: &str) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM backfill_jobs WHERE loader_code = $1 AND status IN ('PENDING', 'RUNNING')",
    )
    .bind(loader_code)
    .fetch_one(pool)
    .await
    .context("count_active_backfill_jobs failed")?;
    Ok(n)
}

/// `PENDING` → `RUNNING`: records which replica took the job and when, the
/// way a `LoadHistory` row records `requestedBy`/`startedAt`. Returns
/// `false` (no row updated) if the job was no longer `PENDING` — the
/// caller's "allowed only if status=PENDING" guard.
pub async fn start_backfill_job(pool: &PgPool, id: Uuid, replica_name: &str, started_at: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE backfill_jobs SET status = 'RUNNING', replica_name = $2, started_at = $3, updated_at = now() WHERE id = $1 AND status = 'PENDING'",
    )
    .bind(id)
    .bind(replica_name)
    .bind(started_at)
    .execute(pool)
    .await
    .context("start_backfill_job failed")?;
    Ok(result.rows_affected() == 1)
}

#[allow(clippy::too_many_arguments)]
pub async fn complete_backfill_job(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    record_count: Option<i32>,
    records_purged: Option<i32>,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE backfill_jobs
        SET status = $2, record_count = $3, records_purged = $4, error_message = $5,
            finished_at = now(), updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(record_count)
    .bind(records_purged)
    .bind(error_message)
    .execute(pool)
    .await
    .context("complete_backfill_job failed")?;
    Ok(())
}

/// `cancel`: allowed only if `status=PENDING`. Returns `false` if the job had
/// already left `PENDING` by the time this ran.
pub async fn cancel_backfill_job(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE backfill_jobs SET status = 'CANCELLED', finished_at = now(), updated_at = now() WHERE id = $1 AND status = 'PENDING'",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("cancel_backfill_job failed")?;
    Ok(result.rows_affected() == 1)
}
