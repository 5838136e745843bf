use etl_types::EtlError;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

/// The payload an `ApprovalRequest.draftJson` must carry for a `LOADER`
/// CREATE (first-version) submission — everything `insert_materialized_loader`
/// needs, already validated against §3's invariants at submit time.
#[derive(Debug, Deserialize)]
struct LoaderCreatePayload {
    loader_code: String,
    sql_encrypted: String,
    source_database_id: Uuid,
    min_interval_seconds: i32,
    max_interval_seconds: i32,
    max_query_period_seconds: i32,
    max_parallel_executions: i32,
    purge_strategy: String,
    source_timezone_offset_hours: i16,
    aggregation_period_seconds: Option<i32>,
}

impl LoaderCreatePayload {
    fn validate(&self) -> Result<(), EtlError> {
        if self.loader_code.trim().is_empty() {
            return Err(EtlError::Validation("loader_code must not be empty".to_string()));
        }
        if self.min_interval_seconds <= 0 || self.max_interval_seconds < self.min_interval_seconds {
            return Err(EtlError::Validation(
                "min_interval_seconds must be positive and <= max_interval_seconds".to_string(),
            ));
        }
        if self.max_query_period_seconds <= 0 {
            return Err(EtlError::Validation("max_query_period_seconds must be positive".to_string()));
        }
        if self.max_parallel_executions <= 0 {
            return Err(EtlError::Validation("max_parallel_executions must be positive".to_string()));
        }
        if !matches!(
            self.purge_strategy.as_str(),
            "PURGE_AND_RELOAD" | "FAIL_ON_DUPLICATE" | "SKIP_DUPLICATES"
        ) {
            return Err(EtlError::Validation(format!("unknown purge_strategy {:?}", self.purge_strategy)));
        }
        Ok(())
    }
}

/// C6's loader materializer (§4.5): a periodic pass over `APPROVED` `LOADER`
/// requests with no live loader, turning each into a real `ACTIVE` version.
/// Stateless — `run_once` is safe to call from a scheduler tick or a cron,
/// and safe to re-run (already-materialized requests no longer match the
/// underlying query).
pub struct LoaderMaterializer {
    pool: PgPool,
}

impl LoaderMaterializer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the number of requests successfully materialized this pass.
    /// A single bad payload is logged and skipped rather than aborting the
    /// whole batch, the way a scheduler tick tolerates one loader's failure.
    pub async fn run_once(&self) -> Result<usize, EtlError> {
        let pending = etl_db::list_unmaterialized_loader_create_requests(&self.pool).await?;
        let mut materialized = 0;

        for request in pending {
            match self.materialize_one(request.id, request.entity_id, &request.draft_json).await {
                Ok(()) => materialized += 1,
                Err(e) => {
                    tracing::warn!(request_id = %request.id, error = %e, "approval/materialize-failed");
                }
            }
        }

        Ok(materialized)
    }

    async fn materialize_one(
        &self,
        request_id: Uuid,
        loader_id: Uuid,
        draft_json: &serde_json::Value,
    ) -> Result<(), EtlError> {
        let payload: LoaderCreatePayload = serde_json::from_value(draft_json.clone())
            .map_err(|e| EtlError::Validation(format!("request {request_id}: malformed draft_json: {e}")))?;
        payload.validate()?;

        etl_db::insert_materialized_loader(
            &self.pool,
            loader_id,
            &payload.loader_code,
            &payload.sql_encrypted,
            payload.source_database_id,
            payload.min_interval_seconds,
            payload.max_interval_seconds,
            payload.max_query_period_seconds,
            payload.max_parallel_executions,
            &payload.purge_strategy,
            payload.source_timezone_offset_hours,
            payload.aggregation_period_seconds,
        )
        .await?;

        tracing::info!(request_id = %request_id, loader_code = %payload.loader_code, "approval/materialized");
        Ok(())
    }
}
