//! C4 ExecutionPipeline: executes one (loader, TimeWindow) pair end to end —
//! placeholder substitution, the query safety gate, ingestion against C1,
//! row transformation through C11, purge-strategy application, the
//! always-written history row, and the post-execution loader state update.

mod placeholders;
mod purge;
mod safety_gate;
mod transform;
mod window;

pub use placeholders::substitute_placeholders;
pub use purge::{apply_purge_strategy, PurgeOutcome};
pub use safety_gate::check_query_is_safe;
pub use transform::{transform_row, TransformedRow};
pub use window::{select_window, TimeWindow};

use chrono::{DateTime, Utc};
use etl_crypto::EncryptedFieldCodec;
use etl_db::LoaderRow;
use etl_sources::SourceRegistry;
use etl_types::{EtlError, PurgeStrategy};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub history_id: Uuid,
    pub status: &'static str,
    pub records_loaded: usize,
    pub records_ingested: u64,
    pub records_purged: u64,
    /// Rows observed from the source this run, before `SKIP_DUPLICATES`
    /// dedup — window advancement and the zero-record-run counter are
    /// decided from this, not from `records_ingested` (§5, §9): a healthy
    /// re-run that only re-observes already-loaded rows must still advance
    /// the window and must not count as a zero-record run.
    pub records_observed: usize,
    pub actual_from: Option<DateTime<Utc>>,
    pub actual_to: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

pub struct ExecutionPipeline {
    control_db: PgPool,
    source_registry: Arc<SourceRegistry>,
    codec: Arc<EncryptedFieldCodec>,
}

impl ExecutionPipeline {
    pub fn new(control_db: PgPool, source_registry: Arc<SourceRegistry>, codec: Arc<EncryptedFieldCodec>) -> Self {
        Self {
            control_db,
            source_registry,
            codec,
        }
    }

    /// Executes `loader` over `window`. A `LoadHistory` row is always
    /// written, even on failure — started as `RUNNING`, then completed with
    /// the final status, so a crash mid-run leaves a visible trace rather
    /// than silence.
    pub async fn run(
        &self,
        loader: &LoaderRow,
        window: TimeWindow,
        requested_by: Option<&str>,
    ) -> Result<RunOutcome, EtlError> {
        let history_id = Uuid::new_v4();
        let started_at = Utc::now();
        etl_db::start_load_history(
            &self.control_db,
            history_id,
            &loader.loader_code,
            window.from_time,
            window.to_time,
            requested_by,
            started_at,
        )
        .await?;

        match self.execute(loader, window).await {
            Ok(outcome) => {
                etl_db::complete_load_history(
                    &self.control_db,
                    history_id,
                    outcome.status,
                    outcome.records_ingested as i32,
                    outcome.actual_from,
                    outcome.actual_to,
                    outcome.error_message.as_deref(),
                )
                .await?;

                let succeeded = outcome.status != "FAILED";
                let post_window_end = if outcome.records_observed > 0 {
                    outcome.actual_to.unwrap_or(window.to_time)
                } else {
                    window.to_time
                };
                etl_db::update_post_execution(
                    &self.control_db,
                    loader.id,
                    post_window_end,
                    succeeded,
                    outcome.records_observed == 0,
                )
                .await?;

                Ok(RunOutcome { history_id, ..outcome })
            }
            Err(e) => {
                etl_db::complete_load_history(
                    &self.control_db,
                    history_id,
                    "FAILED",
                    0,
                    None,
                    None,
                    Some(&e.to_string()),
                )
                .await?;
                etl_db::update_post_execution(&self.control_db, loader.id, window.to_time, false, false).await?;
                Err(e)
            }
        }
    }

    /// Runs the gate-checked query without touching history or the loader's
    /// post-execution state — the `testQuery` path (§4.3).
    pub async fn test_query(&self, loader: &LoaderRow, window: TimeWindow) -> Result<usize, EtlError> {
        let (db_code, sql) = self.prepare_query(loader, window).await?;
        let rows = self.source_registry.run_query(&db_code, &sql).await?;
        Ok(rows.len())
    }

    async fn prepare_query(&self, loader: &LoaderRow, window: TimeWindow) -> Result<(String, String), EtlError> {
        let source = etl_db::get_source_database_by_id(&self.control_db, loader.source_database_id)
            .await?
            .ok_or_else(|| EtlError::SourceUnknown(loader.source_database_id.to_string()))?;

        let plain_sql = self.codec.decrypt(&loader.sql_encrypted)?;
        let substituted = substitute_placeholders(&plain_sql, window, loader.source_timezone_offset_hours);
        check_query_is_safe(&substituted)?;

        Ok((source.db_code, substituted))
    }

    async fn execute(&self, loader: &LoaderRow, window: TimeWindow) -> Result<RunOutcome, EtlError> {
        let (db_code, sql) = self.prepare_query(loader, window).await?;

        let raw_rows = self.source_registry.run_query(&db_code, &sql).await?;
        let records_loaded = raw_rows.len();

        let mut transformed = Vec::with_capacity(raw_rows.len());
        let mut row_errors: Vec<String> = Vec::new();
        for raw in &raw_rows {
            match transform_row(&self.control_db, &loader.loader_code, raw, loader.source_timezone_offset_hours).await {
                Ok(t) => transformed.push(t),
                Err(e) => row_errors.push(e.to_string()),
            }
        }

        let purge_strategy = loader.purge_strategy_enum()?;
        let from_epoch = window.from_time.timestamp();
        let to_epoch = window.to_time.timestamp();

        let rows_for_insert: Vec<(Uuid, Option<i64>, i64, f64)> = transformed
            .iter()
            .map(|t| (Uuid::new_v4(), Some(t.segment_code), t.load_timestamp.timestamp(), t.value))
            .collect();

        // One transaction for the purge delete and the window's insert (§9):
        // a crash between the two must never leave the window purged with
        // nothing reloaded.
        let mut tx = self
            .control_db
            .begin()
            .await
            .map_err(|e| EtlError::Internal(format!("execute: begin tx: {e}")))?;

        let purge_outcome =
            apply_purge_strategy(&mut tx, &loader.loader_code, purge_strategy, from_epoch, to_epoch).await?;
        let records_purged = match purge_outcome {
            PurgeOutcome::Deleted(n) => n,
            PurgeOutcome::NoOp => 0,
        };

        let records_ingested = etl_db::bulk_append_signals_in_tx(
            &mut tx,
            &loader.loader_code,
            &rows_for_insert,
            purge_strategy == PurgeStrategy::SkipDuplicates,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| EtlError::Internal(format!("execute: commit tx: {e}")))?;

        let records_observed = transformed.len();
        let actual_from = transformed.iter().map(|t| t.load_timestamp).min();
        let actual_to = transformed.iter().map(|t| t.load_timestamp).max();

        let status = if row_errors.is_empty() {
            "SUCCESS"
        } else if !transformed.is_empty() {
            "PARTIAL"
        } else {
            "FAILED"
        };

        let error_message = if row_errors.is_empty() {
            None
        } else {
            Some(format!("{} of {} row(s) failed transformation: {}", row_errors.len(), records_loaded, row_errors.join("; ")))
        };

        if status == "FAILED" {
            return Err(EtlError::Validation(error_message.unwrap_or_else(|| "all rows failed transformation".to_string())));
        }

        Ok(RunOutcome {
            history_id: Uuid::nil(),
            status,
            records_loaded,
            records_ingested,
            records_purged,
            records_observed,
            actual_from,
            actual_to,
            error_message,
        })
    }
}
