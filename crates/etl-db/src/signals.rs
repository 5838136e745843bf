use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SignalRow {
    pub id: Uuid,
    pub loader_code: String,
    pub segment_code: Option<i64>,
    pub signal_epoch: i64,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct NewSignal {
    pub loader_code: String,
    pub segment_code: Option<i64>,
    pub signal_epoch: i64,
    pub value: f64,
}

/// C11 `append`: write one signal row.
pub async fn append_signal(pool: &PgPool, id: Uuid, signal: &NewSignal) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO signal_history (id, loader_code, segment_code, signal_epoch, value, create_time)
        VALUES ($1, $2, $3, $4, $5, now())
        "#,
    )
    .bind(id)
    .bind(&signal.loader_code)
    .bind(signal.segment_code)
    .bind(signal.signal_epoch)
    .bind(signal.value)
    .execute(pool)
    .await
    .context("append_signal failed")?;
    Ok(())
}

/// C11 `bulkAppend`: one round trip for a whole window's worth of rows,
/// mirroring `mqk-db::md`'s bulk-ingest shape. Conflicting rows against the
/// `(loaderCode, loadTimestamp, segmentCode)` dedupe key are always
/// inserted; the `SKIP_DUPLICATES` purge strategy is the caller's choice to
/// tolerate the conflict rather than a property of this function — see
/// `bulk_append_signals_skip_duplicates`.
pub async fn bulk_append_signals(
    pool: &PgPool,
    loader_code: &str,
    signals: &[(Uuid, Option<i64>, i64, f64)],
) -> Result<u64> {
    let mut tx = pool.begin().await.context("bulk_append_signals: begin tx")?;
    let written = bulk_insert_in_tx(&mut tx, loader_code, signals, false).await?;
    tx.commit().await.context("bulk_append_signals: commit")?;
    Ok(written)
}

/// Same insert, but conflicts against the dedupe unique index are silently
/// dropped rather than surfaced as an error — the `SKIP_DUPLICATES` purge
/// strategy (§4.3).
pub async fn bulk_append_signals_skip_duplicates(
    pool: &PgPool,
    loader_code: &str,
    signals: &[(Uuid, Option<i64>, i64, f64)],
) -> Result<u64> {
    let mut tx = pool.begin().await.context("bulk_append_signals_skip_duplicates: begin tx")?;
    let written = bulk_insert_in_tx(&mut tx, loader_code, signals, true).await?;
    tx.commit().await.context("bulk_append_signals_skip_duplicates: commit")?;
    Ok(written)
}

/// Same insert, run inside a transaction the caller already owns — used by
/// `etl-pipeline::execute` so the purge delete and the bulk insert for one
/// window commit as a single atomic unit (§9).
pub async fn bulk_append_signals_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    loader_code: &str,
    signals: &[(Uuid, Option<i64>, i64, f64)],
    skip_duplicates: bool,
) -> Result<u64> {
    bulk_insert_in_tx(tx, loader_code, signals, skip_duplicates).await
}

async fn bulk_insert_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    loader_code: &str,
    signals: &[(Uuid, Option<i64>, i64, f64)],
    skip_duplicates: bool,
) -> Result<u64> {
    if signals.is_empty() {
        return Ok(0);
    }

    let conflict_clause = if skip_duplicates {
        "ON CONFLICT (loader_code, signal_epoch, (COALESCE(segment_code, -1::bigint))) DO NOTHING"
    } else {
        ""
    };

    let mut written = 0u64;
    for (id, segment_code, signal_epoch, value) in signals {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO signal_history (id, loader_code, segment_code, signal_epoch, value, create_time)
            VALUES ($1, $2, $3, $4, $5, now())
            {conflict_clause}
            "#,
        ))
        .bind(id)
        .bind(loader_code)
        .bind(segment_code)
        .bind(signal_epoch)
        .bind(value)
        .execute(&mut **tx)
        .await
        .context("bulk_append_signals: insert row")?;
        written += result.rows_affected();
    }
    Ok(written)
}

/// C11 `query`: `fromEpoch >= 0 && fromEpoch < toEpoch` is validated by the
/// caller (etl-pipeline / etl-daemon handler), not here.
pub async fn query_signals(
    pool: &PgPool,
    loader_code: &str,
    from_epoch: i64,
    to_epoch: i64,
    segment_code: Option<i64>,
) -> Result<Vec<SignalRow>> {
    sqlx::query_as::<_, SignalRow>(
        r#"
        SELECT id, loader_code, segment_code, signal_epoch, value
        FROM signal_history
        WHERE loader_code = $1 AND signal_epoch >= $2 AND signal_epoch < $3
          AND ($4::bigint IS NULL OR segment_code = $4)
        ORDER BY signal_epoch
        "#,
    )
    .bind(loader_code)
    .bind(from_epoch)
    .bind(to_epoch)
    .bind(segment_code)
    .fetch_all(pool)
    .await
    .context("query_signals failed")
}

/// Used by C4's `FAIL_ON_DUPLICATE` purge strategy to check for a pre-existing
/// row in the window before inserting anything. Generic over `PgPool` or an
/// open transaction so `apply_purge_strategy` can run it inside the same
/// transaction as the window's insert.
pub async fn count_signals_in_range<'e, E>(
    executor: E,
    loader_code: &str,
    from_epoch: i64,
    to_epoch: i64,
) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let (n,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM signal_history WHERE loader_code = $1 AND signal_epoch >= $2 AND signal_epoch < $3",
    )
    .bind(loader_code)
    .bind(from_epoch)
    .bind(to_epoch)
    .fetch_one(executor)
    .await
    .context("count_signals_in_range failed")?;
    Ok(n)
}

/// C11 `deleteRange`: used only by C4's PURGE_AND_RELOAD strategy. Generic
/// over `PgPool` or an open transaction for the same reason as
/// `count_signals_in_range` — §9 requires the purge delete and the
/// subsequent bulk insert to commit as one atomic unit.
pub async fn delete_signal_range<'e, E>(
    executor: E,
    loader_code: &str,
    from_epoch: i64,
    to_epoch: i64,
) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query(
        "DELETE FROM signal_history WHERE loader_code = $1 AND signal_epoch >= $2 AND signal_epoch < $3",
    )
    .bind(loader_code)
    .bind(from_epoch)
    .bind(to_epoch)
    .execute(executor)
    .await
    .context("delete_signal_range failed")?;
    Ok(result.rows_affected())
}

/// C11 `getOrCreateSegmentCode`: compare-with-null lookup (null equals null)
/// inside a serializable transaction; allocates `max(segmentCode | loaderCode)
/// + 1` on miss, retrying on a unique-constraint collision.
pub async fn get_or_create_segment_code(
    pool: &PgPool,
    loader_code: &str,
    segments: &[Option<&str>; 10],
) -> Result<i64> {
    for _attempt in 0..5 {
        let mut tx = pool
            .begin()
            .await
            .context("get_or_create_segment_code: begin tx")?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .context("get_or_create_segment_code: set isolation level")?;

        let existing: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT segment_code FROM segment_combinations
            WHERE loader_code = $1
              AND seg1 IS NOT DISTINCT FROM $2 AND seg2 IS NOT DISTINCT FROM $3
              AND seg3 IS NOT DISTINCT FROM $4 AND seg4 IS NOT DISTINCT FROM $5
              AND seg5 IS NOT DISTINCT FROM $6 AND seg6 IS NOT DISTINCT FROM $7
              AND seg7 IS NOT DISTINCT FROM $8 AND seg8 IS NOT DISTINCT FROM $9
              AND seg9 IS NOT DISTINCT FROM $10 AND seg10 IS NOT DISTINCT FROM $11
            "#,
        )
        .bind(loader_code)
        .bind(segments[0])
        .bind(segments[1])
        .bind(segments[2])
        .bind(segments[3])
        .bind(segments[4])
        .bind(segments[5])
        .bind(segments[6])
        .bind(segments[7])
        .bind(segments[8])
        .bind(segments[9])
        .fetch_optional(&mut *tx)
        .await
        .context("get_or_create_segment_code: lookup")?;

        if let Some((code,)) = existing {
            tx.commit().await.ok();
            return Ok(code);
        }

        let (next,): (Option<i64>,) =
            sqlx::query_as("SELECT max(segment_code) FROM segment_combinations WHERE loader_code = $1")
                .bind(loader_code)
                .fetch_one(&mut *tx)
                .await
                .context("get_or_create_segment_code: max")?;
        let new_code = next.unwrap_or(0) + 1;

        let insert_result = sqlx::query(
            r#"
            INSERT INTO segment_combinations
                (id, loader_code, segment_code, seg1, seg2, seg3, seg4, seg5, seg6, seg7, seg8, seg9, seg10)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(loader_code)
        .bind(new_code)
        .bind(segments[0])
        .bind(segments[1])
        .bind(segments[2])
        .bind(segments[3])
        .bind(segments[4])
        .bind(segments[5])
        .bind(segments[6])
        .bind(segments[7])
        .bind(segments[8])
        .bind(segments[9])
        .execute(&mut *tx)
        .await;

        match insert_result {
            Ok(_) => {
                tx.commit().await.context("get_or_create_segment_code: commit")?;
                return Ok(new_code);
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tx.rollback().await.ok();
                continue;
            }
            Err(e) => return Err(e).context("get_or_create_segment_code: insert"),
        }
    }

    Err(anyhow::anyhow!(
        "get_or_create_segment_code: exhausted retries for loader_code={loader_code}"
    ))
}
