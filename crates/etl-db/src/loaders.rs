use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use etl_types::PurgeStrategy;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LoaderRow {
    pub id: Uuid,
    pub loader_code: String,
    pub sql_encrypted: String,
    pub source_database_id: Uuid,
    pub min_interval_seconds: i32,
    pub max_interval_seconds: i32,
    pub max_query_period_seconds: i32,
    pub max_parallel_executions: i32,
    pub purge_strategy: String,
    pub source_timezone_offset_hours: i16,
    pub aggregation_period_seconds: Option<i32>,
    pub last_load_timestamp: Option<DateTime<Utc>>,
    pub failed_since: Option<DateTime<Utc>>,
    pub consecutive_zero_record_runs: i32,
    pub load_status: String,
    pub enabled: bool,
    pub approval_status: String,
    pub version_number: i32,
    pub parent_version_id: Option<Uuid>,
    pub version_status: String,
}

impl LoaderRow {
    /// Parses the stored strategy code once at this boundary so callers
    /// match on `PurgeStrategy` instead of re-comparing strings downstream —
    /// a typo surfaces here, not as a runtime `Validation` error deep in the
    /// pipeline.
    pub fn purge_strategy_enum(&self) -> Result<PurgeStrategy> {
        PurgeStrategy::parse(&self.purge_strategy).with_context(|| {
            format!(
                "loader {} has unrecognized purge_strategy {:?}",
                self.loader_code, self.purge_strategy
            )
        })
    }
}

const LOADER_COLUMNS: &str = r#"
    id, loader_code, sql_encrypted, source_database_id, min_interval_seconds,
    max_interval_seconds, max_query_period_seconds, max_parallel_executions,
    purge_strategy, source_timezone_offset_hours, aggregation_period_seconds,
    last_load_timestamp, failed_since, consecutive_zero_record_runs,
    load_status, enabled, approval_status, version_number, parent_version_id,
    version_status
"#;

/// The loaders a scheduler tick fans out over: `enabled = true` (which per
/// §3's invariant implies `APPROVED` + `ACTIVE`).
pub async fn list_enabled_loaders(pool: &PgPool) -> Result<Vec<LoaderRow>> {
    sqlx::query_as::<_, LoaderRow>(&format!(
        "SELECT {LOADER_COLUMNS} FROM loaders WHERE enabled = true ORDER BY loader_code"
    ))
    .fetch_all(pool)
    .await
    .context("list_enabled_loaders failed")
}

/// Generic over `PgPool` or an open transaction so `ApprovalWorkflow` can
/// read a loader's current row mid-transaction, before mutating it.
pub async fn get_loader_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<LoaderRow>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query_as::<_, LoaderRow>(&format!("SELECT {LOADER_COLUMNS} FROM loaders WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("get_loader_by_id failed")
}

/// The single `ACTIVE` version for a `loaderCode`, if any (§3 invariant: at
/// most one).
pub async fn get_active_loader(pool: &PgPool, loader_code: &str) -> Result<Option<LoaderRow>> {
    sqlx::query_as::<_, LoaderRow>(&format!(
        "SELECT {LOADER_COLUMNS} FROM loaders WHERE loader_code = $1 AND version_status = 'ACTIVE'"
    ))
    .bind(loader_code)
    .fetch_optional(pool)
    .await
    .context("get_active_loader failed")
}

/// Insert a new `DRAFT` version row. Loader rows are only ever created this
/// way — the materializer path owns this insert; nothing else calls it.
#[allow(clippy::too_many_arguments)]
pub async fn insert_loader_draft(
    pool: &PgPool,
    id: Uuid,
    loader_code: &str,
    sql_encrypted: &str,
    source_database_id: Uuid,
    min_interval_seconds: i32,
    max_interval_seconds: i32,
    max_query_period_seconds: i32,
    max_parallel_executions: i32,
    purge_strategy: &str,
    source_timezone_offset_hours: i16,
    aggregation_period_seconds: Option<i32>,
    version_number: i32,
    parent_version_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO loaders (
            id, loader_code, sql_encrypted, source_database_id, min_interval_seconds,
            max_interval_seconds, max_query_period_seconds, max_parallel_executions,
            purge_strategy, source_timezone_offset_hours, aggregation_period_seconds,
            version_number, parent_version_id, version_status, approval_status, enabled
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'DRAFT', 'PENDING_APPROVAL', false)
        "#,
    )
    .bind(id)
    .bind(loader_code)
    .bind(sql_encrypted)
    .bind(source_database_id)
    .bind(min_interval_seconds)
    .bind(max_interval_seconds)
    .bind(max_query_period_seconds)
    .bind(max_parallel_executions)
    .bind(purge_strategy)
    .bind(source_timezone_offset_hours)
    .bind(aggregation_period_seconds)
    .bind(version_number)
    .bind(parent_version_id)
    .execute(pool)
    .await
    .context("insert_loader_draft failed")?;
    Ok(())
}

/// Insert a loader directly in its materialized `ACTIVE` state — the C6
/// loader materializer's CREATE path (§4.5), the only other writer of
/// `loaders` rows besides `insert_loader_draft`. Idempotent from the
/// caller's perspective: the materializer only calls this once per approval
/// request, guarded by `loader_id` already existing.
#[allow(clippy::too_many_arguments)]
pub async fn insert_materialized_loader(
    pool: &PgPool,
    id: Uuid,
    loader_code: &str,
    sql_encrypted: &str,
    source_database_id: Uuid,
    min_interval_seconds: i32,
    max_interval_seconds: i32,
    max_query_period_seconds: i32,
    max_parallel_executions: i32,
    purge_strategy: &str,
    source_timezone_offset_hours: i16,
    aggregation_period_seconds: Option<i32>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO loaders (
            id, loader_code, sql_encrypted, source_database_id, min_interval_seconds,
            max_interval_seconds, max_query_period_seconds, max_parallel_executions,
            purge_strategy, source_timezone_offset_hours, aggregation_period_seconds,
            version_number, parent_version_id, version_status, approval_status, enabled
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 1, NULL, 'ACTIVE', 'APPROVED', false)
        "#,
    )
    .bind(id)
    .bind(loader_code)
    .bind(sql_encrypted)
    .bind(source_database_id)
    .bind(min_interval_seconds)
    .bind(max_interval_seconds)
    .bind(max_query_period_seconds)
    .bind(max_parallel_executions)
    .bind(purge_strategy)
    .bind(source_timezone_offset_hours)
    .bind(aggregation_period_seconds)
    .execute(pool)
    .await
    .context("insert_materialized_loader failed")?;
    Ok(())
}

/// Transition a version's `(versionStatus, approvalStatus, enabled)` triple.
/// Generic over `PgPool` or an open transaction so C6 can run it inside the
/// same transaction as the archive write; the §3 invariant (at most one
/// ACTIVE version) is enforced by the caller before invoking this.
pub async fn set_version_status<'e, E>(
    executor: E,
    loader_id: Uuid,
    version_status: &str,
    approval_status: &str,
    enabled: bool,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        "UPDATE loaders SET version_status = $1, approval_status = $2, enabled = $3, updated_at = now() WHERE id = $4",
    )
    .bind(version_status)
    .bind(approval_status)
    .bind(enabled)
    .bind(loader_id)
    .execute(executor)
    .await
    .context("set_version_status failed")?;
    Ok(())
}

/// Post-execution state update (§5 ordering guarantee): `lastLoadTimestamp`
/// only advances, never regresses; a concurrent commit with an older window
/// end is silently discarded.
pub async fn update_post_execution(
    pool: &PgPool,
    loader_id: Uuid,
    window_end: DateTime<Utc>,
    succeeded: bool,
    zero_records: bool,
) -> Result<()> {
    if succeeded {
        sqlx::query(
            r#"
            UPDATE loaders
            SET last_load_timestamp = GREATEST(COALESCE(last_load_timestamp, $2), $2),
                load_status = 'IDLE',
                failed_since = NULL,
                consecutive_zero_record_runs = CASE WHEN $3 THEN consecutive_zero_record_runs + 1 ELSE 0 END,
                updated_at = now()
            WHERE id = $1 AND (last_load_timestamp IS NULL OR last_load_timestamp < $2)
            "#,
        )
        .bind(loader_id)
        .bind(window_end)
        .bind(zero_records)
        .execute(pool)
        .await
        .context("update_post_execution (success) failed")?;
    } else {
        sqlx::query(
            r#"
            UPDATE loaders
            SET load_status = 'FAILED',
                failed_since = COALESCE(failed_since, now()),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(loader_id)
        .execute(pool)
        .await
        .context("update_post_execution (failure) failed")?;
    }
    Ok(())
}
