use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoadHistoryRow {
    pub id: Uuid,
    pub loader_code: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub status: String,
    pub record_count: i32,
    pub actual_from: Option<DateTime<Utc>>,
    pub actual_to: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub requested_by: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

const HISTORY_COLUMNS: &str = r#"
    id, loader_code, window_start, window_end, status, record_count,
    actual_from, actual_to, error_message, requested_by, started_at, finished_at
"#;

/// `LoadHistory` is the authoritative per-run record (§9 Open Question:
/// `loadStatus` on `Loader` is a coarse hint only). One row per execution
/// attempt: written `RUNNING` on entry, then completed on exit — so a crash
/// mid-execution leaves a visible `RUNNING` row rather than no trace at all.
pub async fn start_load_history(
    pool: &PgPool,
    id: Uuid,
    loader_code: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    requested_by: Option<&str>,
    started_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO load_history (
            id, loader_code, window_start, window_end, status, record_count, requested_by, started_at
        ) VALUES ($1, $2, $3, $4, 'RUNNING', 0, $5, $6)
        "#,
    )
    .bind(id)
    .bind(loader_code)
    .bind(window_start)
    .bind(window_end)
    .bind(requested_by)
    .bind(started_at)
    .execute(pool)
    .await
    .context("start_load_history failed")?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn complete_load_history(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    record_count: i32,
    actual_from: Option<DateTime<Utc>>,
    actual_to: Option<DateTime<Utc>>,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE load_history
        SET status = $2, record_count = $3, actual_from = $4, actual_to = $5,
            error_message = $6, finished_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(record_count)
    .bind(actual_from)
    .bind(actual_to)
    .bind(error_message)
    .execute(pool)
    .await
    .context("complete_load_history failed")?;
    Ok(())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoaderStats {
    pub total_runs: i64,
    pub success_runs: i64,
    pub partial_runs: i64,
    pub failed_runs: i64,
    pub total_records_ingested: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
}

/// Aggregate counters for a loader's "get stats" operational endpoint (§6).
pub async fn loader_stats(pool: &PgPool, loader_code: &str) -> Result<LoaderStats> {
    sqlx::query_as::<_, LoaderStats>(
        r#"
        SELECT
            count(*) AS total_runs,
            count(*) FILTER (WHERE status = 'SUCCESS') AS success_runs,
            count(*) FILTER (WHERE status = 'PARTIAL') AS partial_runs,
            count(*) FILTER (WHERE status = 'FAILED') AS failed_runs,
            COALESCE(sum(record_count), 0) AS total_records_ingested,
            max(started_at) AS last_run_at,
            (SELECT status FROM load_history WHERE loader_code = $1 ORDER BY started_at DESC LIMIT 1) AS last_status
        FROM load_history
        WHERE loader_code = $1
        "#,
    )
    .bind(loader_code)
    .fetch_one(pool)
    .await
    .context("loader_stats failed")
}

/// The most recent `limit` history rows for a loader, newest first — used by
/// C9's gap scanner to find the timeline's boundaries and internal gaps, and
/// by the "get recent activity" operational endpoint (§6).
pub async fn latest_load_history(
    pool: &PgPool,
    loader_code: &str,
    limit: i64,
) -> Result<Vec<LoadHistoryRow>> {
    sqlx::query_as::<_, LoadHistoryRow>(&format!(
        r#"
        SELECT {HISTORY_COLUMNS}
        FROM load_history
        WHERE loader_code = $1
        ORDER BY window_start DESC
        LIMIT $2
        "#
    ))
    .bind(loader_code)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("latest_load_history failed")
}
