//! Axum router and all HTTP handlers for etl-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use etl_pipeline::TimeWindow;
use etl_types::EtlError;
use uuid::Uuid;

use crate::auth::{AdminUser, AuthenticatedUser};
use crate::api_types::*;
use crate::state::{uptime_secs, AppState};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        // Loader CRUD + operational endpoints
        .route("/v1/loaders", get(list_loaders).post(create_loader))
        .route(
            "/v1/loaders/:loader_code",
            get(get_loader).put(update_loader).delete(delete_loader),
        )
        .route("/v1/loaders/:loader_code/stats", get(loader_stats))
        .route("/v1/loaders/:loader_code/activity", get(loader_activity))
        .route("/v1/loaders/:loader_code/test-query", post(test_query))
        // Approval endpoints
        .route("/v1/approvals", post(submit_approval))
        .route("/v1/approvals/pending", get(list_pending_approvals))
        .route("/v1/approvals/:request_id", get(get_approval))
        .route("/v1/approvals/:request_id/approve", post(approve_request))
        .route("/v1/approvals/:request_id/reject", post(reject_request))
        .route("/v1/approvals/:request_id/resubmit", post(resubmit_request))
        .route("/v1/approvals/:request_id/revoke", post(revoke_request))
        .route("/v1/approvals/:request_id/actions", get(approval_actions))
        .route(
            "/v1/approvals/entity/:entity_type/:entity_id/history",
            get(approval_history_for_entity),
        )
        // Backfill endpoints
        .route("/v1/backfill", get(list_backfill).post(submit_backfill))
        .route("/v1/backfill/:job_id", get(get_backfill))
        .route("/v1/backfill/:job_id/cancel", post(cancel_backfill))
        // Signals endpoints
        .route("/v1/signals", get(query_signals).post(append_signal))
        .route("/v1/signals/bulk", post(bulk_append_signals))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping (§7)
// ---------------------------------------------------------------------------

/// Maps the stable `EtlError` taxonomy onto HTTP status codes per §7's
/// permanent/transient classification. Transient errors (source unavailable,
/// circuit open) surface as `503` so a caller knows retrying may help;
/// everything else is a client-facing `4xx`.
fn map_err(e: EtlError) -> Response {
    let status = match &e {
        EtlError::Validation(_) => StatusCode::BAD_REQUEST,
        EtlError::NotFound(_) => StatusCode::NOT_FOUND,
        EtlError::Conflict(_) => StatusCode::CONFLICT,
        EtlError::IllegalState(_) => StatusCode::CONFLICT,
        EtlError::Auth(_) => StatusCode::UNAUTHORIZED,
        EtlError::SourceUnknown(_) => StatusCode::NOT_FOUND,
        EtlError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        EtlError::DuplicateData(_) => StatusCode::CONFLICT,
        EtlError::Encryption(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EtlError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
        EtlError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
            uptime_secs: uptime_secs(),
            replica_name: st.replica_name.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Loader CRUD + operational endpoints
// ---------------------------------------------------------------------------

pub(crate) async fn list_loaders(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
) -> Response {
    match etl_db::list_enabled_loaders(&st.control_db).await {
        Ok(loaders) => Json(LoaderListResponse { loaders }).into_response(),
        Err(e) => map_err(e.into()),
    }
}

pub(crate) async fn get_loader(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(loader_code): Path<String>,
) -> Response {
    match etl_db::get_active_loader(&st.control_db, &loader_code).await {
        Ok(Some(loader)) => Json(LoaderResponse { loader }).into_response(),
        Ok(None) => map_err(EtlError::NotFound(format!("loader {loader_code} not found"))),
        Err(e) => map_err(e.into()),
    }
}

pub(crate) async fn loader_stats(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(loader_code): Path<String>,
) -> Response {
    match etl_db::loader_stats(&st.control_db, &loader_code).await {
        Ok(stats) => Json(LoaderStatsResponse { stats }).into_response(),
        Err(e) => map_err(e.into()),
    }
}

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;

pub(crate) async fn loader_activity(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(loader_code): Path<String>,
) -> Response {
    match etl_db::latest_load_history(&st.control_db, &loader_code, DEFAULT_ACTIVITY_LIMIT).await {
        Ok(history) => Json(LoaderActivityResponse { history }).into_response(),
        Err(e) => map_err(e.into()),
    }
}

/// `POST /v1/loaders`: always a CREATE, routed through the approval
/// workflow (§4.5) rather than inserting a materialized row directly — the
/// periodic materializer (`LoaderMaterializer::run_once`) turns it into a
/// real `loaders` row once approved.
pub(crate) async fn create_loader(
    State(st): State<Arc<AppState>>,
    AdminUser(identity): AdminUser,
    Json(body): Json<LoaderDraftRequest>,
) -> Response {
    let sql_encrypted = match st.codec.encrypt(&body.sql) {
        Ok(s) => s,
        Err(e) => return map_err(e.into()),
    };
    let loader_id = Uuid::new_v4();
    let draft_json = serde_json::json!({
        "loader_code": body.loader_code,
        "sql_encrypted": sql_encrypted,
        "source_database_id": body.source_database_id,
        "min_interval_seconds": body.min_interval_seconds,
        "max_interval_seconds": body.max_interval_seconds,
        "max_query_period_seconds": body.max_query_period_seconds,
        "max_parallel_executions": body.max_parallel_executions,
        "purge_strategy": body.purge_strategy,
        "source_timezone_offset_hours": body.source_timezone_offset_hours,
        "aggregation_period_seconds": body.aggregation_period_seconds,
    });

    match st.approval.submit("LOADER", loader_id, &identity.username, draft_json).await {
        Ok(approval_request_id) => {
            Json(SubmittedApprovalResponse { approval_request_id }).into_response()
        }
        Err(e) => map_err(e),
    }
}

/// `PUT /v1/loaders/{loaderCode}`: inserts a new `DRAFT` version behind the
/// currently `ACTIVE` one, then opens an UPDATE approval request naming it.
/// `ApprovalWorkflow::approve` promotes it synchronously (no materializer
/// pass needed for updates — see `etl-approval`'s workflow).
pub(crate) async fn update_loader(
    State(st): State<Arc<AppState>>,
    AdminUser(identity): AdminUser,
    Path(loader_code): Path<String>,
    Json(body): Json<LoaderDraftRequest>,
) -> Response {
    let active = match etl_db::get_active_loader(&st.control_db, &loader_code).await {
        Ok(Some(l)) => l,
        Ok(None) => return map_err(EtlError::NotFound(format!("loader {loader_code} not found"))),
        Err(e) => return map_err(e.into()),
    };

    let sql_encrypted = match st.codec.encrypt(&body.sql) {
        Ok(s) => s,
        Err(e) => return map_err(e.into()),
    };
    let new_draft_id = Uuid::new_v4();
    if let Err(e) = etl_db::insert_loader_draft(
        &st.control_db,
        new_draft_id,
        &body.loader_code,
        &sql_encrypted,
        body.source_database_id,
        body.min_interval_seconds,
        body.max_interval_seconds,
        body.max_query_period_seconds,
        body.max_parallel_executions,
        &body.purge_strategy,
        body.source_timezone_offset_hours,
        body.aggregation_period_seconds,
        active.version_number + 1,
        Some(active.id),
    )
    .await
    {
        return map_err(e.into());
    }

    match st
        .approval
        .submit_loader_update(active.id, new_draft_id, &identity.username)
        .await
    {
        Ok(approval_request_id) => {
            Json(SubmittedApprovalResponse { approval_request_id }).into_response()
        }
        Err(e) => map_err(e),
    }
}

/// `DELETE /v1/loaders/{loaderCode}`: no dedicated "deleted" `versionStatus`
/// exists in §3 (only `DRAFT`/`ACTIVE`/`ARCHIVED`/`REJECTED`), so deletion is
/// an operator override that archives the `ACTIVE` version through
/// `ApprovalWorkflow::archive_active_version` and turns `enabled` off. It
/// goes through the workflow rather than touching `etl_db`'s loader-mutation
/// primitives directly, so the archive and the status flip stay one
/// transaction. It never leaves a second live version behind: there is
/// nothing to promote in its place.
pub(crate) async fn delete_loader(
    State(st): State<Arc<AppState>>,
    AdminUser(identity): AdminUser,
    Path(loader_code): Path<String>,
) -> Response {
    let active = match etl_db::get_active_loader(&st.control_db, &loader_code).await {
        Ok(Some(l)) => l,
        Ok(None) => return map_err(EtlError::NotFound(format!("loader {loader_code} not found"))),
        Err(e) => return map_err(e.into()),
    };

    match st
        .approval
        .archive_active_version(&active, &identity.username, "deleted via operator endpoint")
        .await
    {
        Ok(()) => Json(OkResponse { ok: true }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn test_query(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(loader_code): Path<String>,
    Json(body): Json<TestQueryRequest>,
) -> Response {
    if body.from_epoch < 0 || body.from_epoch >= body.to_epoch {
        return map_err(EtlError::Validation(
            "fromEpoch must be >= 0 and < toEpoch".to_string(),
        ));
    }
    let loader = match etl_db::get_active_loader(&st.control_db, &loader_code).await {
        Ok(Some(l)) => l,
        Ok(None) => return map_err(EtlError::NotFound(format!("loader {loader_code} not found"))),
        Err(e) => return map_err(e.into()),
    };

    let window = TimeWindow {
        from_time: chrono::DateTime::from_timestamp(body.from_epoch, 0).unwrap_or_default(),
        to_time: chrono::DateTime::from_timestamp(body.to_epoch, 0).unwrap_or_default(),
    };

    match st.pipeline.test_query(&loader, window).await {
        Ok(row_count) => Json(TestQueryResponse { row_count }).into_response(),
        Err(e) => map_err(e),
    }
}

// ---------------------------------------------------------------------------
// Approval endpoints
// ---------------------------------------------------------------------------

pub(crate) async fn submit_approval(
    State(st): State<Arc<AppState>>,
    AdminUser(identity): AdminUser,
    Json(body): Json<SubmitApprovalRequest>,
) -> Response {
    match st
        .approval
        .submit(&body.entity_type, body.entity_id, &identity.username, body.draft_json)
        .await
    {
        Ok(approval_request_id) => {
            Json(SubmittedApprovalResponse { approval_request_id }).into_response()
        }
        Err(e) => map_err(e),
    }
}

pub(crate) async fn get_approval(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> Response {
    match st.approval.get(request_id).await {
        Ok(request) => Json(ApprovalRequestResponse { request }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn list_pending_approvals(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Query(params): Query<ListPendingParams>,
) -> Response {
    match st.approval.list_pending(params.entity_type.as_deref()).await {
        Ok(requests) => Json(ApprovalListResponse { requests }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn approve_request(
    State(st): State<Arc<AppState>>,
    AdminUser(identity): AdminUser,
    Path(request_id): Path<Uuid>,
) -> Response {
    match st.approval.approve(request_id, &identity.username).await {
        Ok(()) => Json(OkResponse { ok: true }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn reject_request(
    State(st): State<Arc<AppState>>,
    AdminUser(identity): AdminUser,
    Path(request_id): Path<Uuid>,
    Json(body): Json<RejectRequest>,
) -> Response {
    match st.approval.reject(request_id, &identity.username, &body.justification).await {
        Ok(()) => Json(OkResponse { ok: true }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn resubmit_request(
    State(st): State<Arc<AppState>>,
    AdminUser(identity): AdminUser,
    Path(request_id): Path<Uuid>,
    Json(body): Json<ResubmitRequest>,
) -> Response {
    match st.approval.resubmit(request_id, &identity.username, body.revised_draft).await {
        Ok(()) => Json(OkResponse { ok: true }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn revoke_request(
    State(st): State<Arc<AppState>>,
    AdminUser(identity): AdminUser,
    Path(request_id): Path<Uuid>,
    Json(body): Json<RevokeRequest>,
) -> Response {
    match st.approval.revoke(request_id, &identity.username, &body.justification).await {
        Ok(()) => Json(OkResponse { ok: true }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn approval_actions(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> Response {
    match st.approval.actions_for_request(request_id).await {
        Ok(actions) => Json(ApprovalActionsResponse { actions }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn approval_history_for_entity(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path((entity_type, entity_id)): Path<(String, Uuid)>,
) -> Response {
    match st.approval.history_for_entity(&entity_type, entity_id).await {
        Ok(requests) => Json(ApprovalListResponse { requests }).into_response(),
        Err(e) => map_err(e),
    }
}

// ---------------------------------------------------------------------------
// Backfill endpoints
// ---------------------------------------------------------------------------

pub(crate) async fn submit_backfill(
    State(st): State<Arc<AppState>>,
    AdminUser(identity): AdminUser,
    Json(body): Json<SubmitBackfillRequest>,
) -> Response {
    match st
        .backfill
        .submit(
            &body.loader_code,
            body.from_time,
            body.to_time,
            body.purge_strategy.as_deref(),
            &identity.username,
        )
        .await
    {
        Ok(job_id) => Json(SubmitBackfillResponse { job_id }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn get_backfill(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Path(job_id): Path<Uuid>,
) -> Response {
    match st.backfill.get(job_id).await {
        Ok(job) => Json(BackfillJobResponse { job }).into_response(),
        Err(e) => map_err(e),
    }
}

#[derive(serde::Deserialize)]
pub(crate) struct ListBackfillParams {
    loader_code: Option<String>,
    status: Option<String>,
}

pub(crate) async fn list_backfill(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Query(params): Query<ListBackfillParams>,
) -> Response {
    let result = if let Some(loader_code) = params.loader_code {
        st.backfill.list_for_loader(&loader_code).await
    } else if let Some(status) = params.status {
        etl_db::list_backfill_jobs_by_status(&st.control_db, &status)
            .await
            .map_err(EtlError::from)
    } else {
        return map_err(EtlError::Validation(
            "list backfill jobs requires loader_code or status".to_string(),
        ));
    };

    match result {
        Ok(jobs) => Json(BackfillListResponse { jobs }).into_response(),
        Err(e) => map_err(e),
    }
}

pub(crate) async fn cancel_backfill(
    State(st): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(job_id): Path<Uuid>,
) -> Response {
    match st.backfill.cancel(job_id).await {
        Ok(()) => Json(OkResponse { ok: true }).into_response(),
        Err(e) => map_err(e),
    }
}

// ---------------------------------------------------------------------------
// Signals endpoints
// ---------------------------------------------------------------------------

/// §6 caps bulk append at 10,000 rows per request.
const MAX_BULK_SIGNALS: usize = 10_000;

pub(crate) async fn append_signal(
    State(st): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Json(body): Json<AppendSignalRequest>,
) -> Response {
    let signal = etl_db::NewSignal {
        loader_code: body.loader_code,
        segment_code: body.segment_code,
        signal_epoch: body.signal_epoch,
        value: body.value,
    };
    match etl_db::append_signal(&st.control_db, Uuid::new_v4(), &signal).await {
        Ok(()) => Json(OkResponse { ok: true }).into_response(),
        Err(e) => map_err(e.into()),
    }
}

pub(crate) async fn query_signals(
    State(st): State<Arc<AppState>>,
    AuthenticatedUser(_): AuthenticatedUser,
    Query(params): Query<QuerySignalsParams>,
) -> Response {
    if params.from_epoch < 0 || params.from_epoch >= params.to_epoch {
        return map_err(EtlError::Validation(
            "fromEpoch must be >= 0 and < toEpoch".to_string(),
        ));
    }
    match etl_db::query_signals(
        &st.control_db,
        &params.loader_code,
        params.from_epoch,
        params.to_epoch,
        params.segment_code,
    )
    .await
    {
        Ok(signals) => Json(QuerySignalsResponse { signals }).into_response(),
        Err(e) => map_err(e.into()),
    }
}

pub(crate) async fn bulk_append_signals(
    State(st): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Json(body): Json<BulkAppendSignalsRequest>,
) -> Response {
    if body.signals.len() > MAX_BULK_SIGNALS {
        return map_err(EtlError::Validation(format!(
            "bulk append is capped at {MAX_BULK_SIGNALS} rows per request, got {}",
            body.signals.len()
        )));
    }
    let rows: Vec<(Uuid, Option<i64>, i64, f64)> = body
        .signals
        .iter()
        .map(|s| (Uuid::new_v4(), s.segment_code, s.signal_epoch, s.value))
        .collect();

    let result = if body.skip_duplicates {
        etl_db::bulk_append_signals_skip_duplicates(&st.control_db, &body.loader_code, &rows).await
    } else {
        etl_db::bulk_append_signals(&st.control_db, &body.loader_code, &rows).await
    };

    match result {
        Ok(written) => Json(BulkAppendSignalsResponse { written }).into_response(),
        Err(e) => map_err(e.into()),
    }
}
