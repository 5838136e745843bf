//! Persistence for every §3 entity, plus the C11 SignalsStore facade
//! operations. Function-per-operation over a `PgPool`, the way `mqk-db`
//! structures its data-access layer — no repository traits, no ORM.

mod approval;
mod backfill;
mod endpoints;
mod history;
mod loaders;
mod locks;
mod signals;
mod source_databases;

pub use approval::{
    archive_rejected_draft, get_approval_request_by_id, insert_approval_action,
    insert_approval_request, list_actions_for_request, list_archive_for_loader_code,
    list_pending_approval_requests, list_requests_for_entity,
    list_unmaterialized_loader_create_requests, promote_loader_version, retire_loader_version,
    update_approval_request_status, ApprovalActionRow, ApprovalRequestRow, ArchivedVersionRow,
};
pub use backfill::{
    cancel_backfill_job, complete_backfill_job, count_active_backfill_jobs, get_backfill_job,
    insert_backfill_job, list_backfill_jobs, list_backfill_jobs_by_status, start_backfill_job,
    BackfillJobRow,
};
pub use endpoints::{list_api_endpoints, register_api_endpoint, ApiEndpointRow};
pub use history::{
    complete_load_history, latest_load_history, loader_stats, start_load_history, LoadHistoryRow,
    LoaderStats,
};
pub use loaders::{
    get_active_loader, get_loader_by_id, insert_loader_draft, insert_materialized_loader,
    list_enabled_loaders, set_version_status, update_post_execution, LoaderRow,
};
pub use locks::{
    cleanup_stale_locks, count_active_locks_for_loader, count_active_locks_global,
    delete_retained_locks, release_lock, try_acquire_lock, LockRow,
};
pub use signals::{
    append_signal, bulk_append_signals, bulk_append_signals_in_tx,
    bulk_append_signals_skip_duplicates, count_signals_in_range, delete_signal_range,
    get_or_create_segment_code, query_signals, NewSignal, SignalRow,
};
pub use source_databases::{
    get_source_database_by_code, get_source_database_by_id, insert_source_database,
    list_source_databases, SourceDatabaseRow,
};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const ENV_DB_URL: &str = "ETL_CONTROL_DB_URL";

/// Connect to the control-plane Postgres database named by `ETL_CONTROL_DB_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to control-plane Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity + schema-presence check, the way `mqk_db::status` reports on
/// `runs` — here against `loaders`.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from information_schema.tables
            where table_schema = 'public' and table_name = 'loaders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_loaders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_loaders_table: bool,
}

/// Test helper: connect + ensure migrations are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}
