use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LockRow {
    pub id: Uuid,
    pub loader_code: String,
    pub replica_name: String,
    pub acquired_at: DateTime<Utc>,
    pub released: bool,
    pub released_at: Option<DateTime<Utc>>,
}

pub async fn count_active_locks_for_loader(pool: &PgPool, loader_code: &str) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM loader_execution_locks WHERE loader_code = $1 AND released = false",
    )
    .bind(loader_code)
    .fetch_one(pool)
    .await
    .context("count_active_locks_for_loader failed")?;
    Ok(n)
}

pub async fn count_active_locks_global(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM loader_execution_locks WHERE released = false")
            .fetch_one(pool)
            .await
            .context("count_active_locks_global failed")?;
    Ok(n)
}

/// Atomically checks per-loader and global active-lock counts against the
/// given caps and, if both hold, inserts the lock row — all within one
/// transaction, the way `outbox_claim_batch` pairs its `FOR UPDATE SKIP
/// LOCKED` select with the claiming update so no concurrent caller can
/// observe a stale count. `SELECT ... FOR UPDATE` on the loader's own rows
/// serializes concurrent acquisition attempts for the same `loaderCode`.
pub async fn try_acquire_lock(
    pool: &PgPool,
    lock_id: Uuid,
    loader_code: &str,
    replica_name: &str,
    max_parallel_executions: i32,
    global_limit: i64,
) -> Result<Option<LockRow>> {
    let mut tx = pool.begin().await.context("try_acquire_lock: begin tx")?;

    // Serialize concurrent acquirers for this loader_code.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(loader_code)
        .execute(&mut *tx)
        .await
        .context("try_acquire_lock: advisory lock")?;

    // Fixed-key advisory lock serializes the global count-and-insert across
    // *all* loaders, not just this one — without it two different loaders'
    // acquirers can both observe a stale active_global below global_limit
    // and both insert, blowing past GLOBAL_LIMIT.
    sqlx::query("SELECT pg_advisory_xact_lock(0)")
        .execute(&mut *tx)
        .await
        .context("try_acquire_lock: global advisory lock")?;

    let (active_for_loader,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM loader_execution_locks WHERE loader_code = $1 AND released = false",
    )
    .bind(loader_code)
    .fetch_one(&mut *tx)
    .await
    .context("try_acquire_lock: count active for loader")?;

    let (active_global,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM loader_execution_locks WHERE released = false")
            .fetch_one(&mut *tx)
            .await
            .context("try_acquire_lock: count active global")?;

    if active_for_loader >= max_parallel_executions as i64 || active_global >= global_limit {
        tx.rollback().await.ok();
        return Ok(None);
    }

    let row = sqlx::query_as::<_, LockRow>(
        r#"
        INSERT INTO loader_execution_locks (id, loader_code, replica_name, acquired_at, released)
        VALUES ($1, $2, $3, now(), false)
        RETURNING id, loader_code, replica_name, acquired_at, released, released_at
        "#,
    )
    .bind(lock_id)
    .bind(loader_code)
    .bind(replica_name)
    .fetch_one(&mut *tx)
    .await
    .context("try_acquire_lock: insert")?;

    tx.commit().await.context("try_acquire_lock: commit")?;
    Ok(Some(row))
}

/// Releasing an already-released or unknown lock is a no-op; the caller logs
/// a warning rather than treating it as an error (§4.2).
pub async fn release_lock(pool: &PgPool, lock_id: Uuid) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        UPDATE loader_execution_locks
        SET released = true, released_at = now()
        WHERE id = $1 AND released = false
        RETURNING id
        "#,
    )
    .bind(lock_id)
    .fetch_optional(pool)
    .await
    .context("release_lock failed")?;
    Ok(row.is_some())
}

/// Atomically marks released any lock held past `stale_threshold`. Returns
/// the count affected.
pub async fn cleanup_stale_locks(
    pool: &PgPool,
    stale_before: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE loader_execution_locks
        SET released = true, released_at = now()
        WHERE released = false AND acquired_at < $1
        "#,
    )
    .bind(stale_before)
    .execute(pool)
    .await
    .context("cleanup_stale_locks failed")?;
    Ok(result.rows_affected())
}

/// Retention job: physically deletes released locks older than
/// `retained_before`. `LoaderExecutionLock` is the only entity the control
/// plane ever physically deletes (§3).
pub async fn delete_retained_locks(pool: &PgPool, retained_before: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM loader_execution_locks WHERE released = true AND released_at < $1")
        .bind(retained_before)
        .execute(pool)
        .await
        .context("delete_retained_locks failed")?;
    Ok(result.rows_affected())
}
