//! Request and response types for every etl-daemon HTTP endpoint.
//!
//! These are plain `Serialize`/`Deserialize` DTOs — no business logic lives
//! here. Where a DTO mirrors a stored row exactly, it's `#[serde(flatten)]`ed
//! rather than re-declared field-by-field.

use chrono::{DateTime, Utc};
use etl_db::{
    ApprovalActionRow, ApprovalRequestRow, BackfillJobRow, LoadHistoryRow, LoaderRow, LoaderStats,
    SignalRow,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Generic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub replica_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Body for `POST /v1/loaders` and `PUT /v1/loaders/{loaderCode}` — both go
/// through the approval workflow (§4.5), so this mirrors the materializer's
/// `LoaderCreatePayload` shape rather than the stored `LoaderRow`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoaderDraftRequest {
    pub loader_code: String,
    pub sql: String,
    pub source_database_id: Uuid,
    pub min_interval_seconds: i32,
    pub max_interval_seconds: i32,
    pub max_query_period_seconds: i32,
    pub max_parallel_executions: i32,
    pub purge_strategy: String,
    pub source_timezone_offset_hours: i16,
    pub aggregation_period_seconds: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmittedApprovalResponse {
    pub approval_request_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoaderResponse {
    #[serde(flatten)]
    pub loader: LoaderRow,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoaderListResponse {
    pub loaders: Vec<LoaderRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoaderStatsResponse {
    #[serde(flatten)]
    pub stats: LoaderStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoaderActivityResponse {
    pub history: Vec<LoadHistoryRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestQueryRequest {
    pub from_epoch: i64,
    pub to_epoch: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestQueryResponse {
    pub row_count: usize,
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

/// Body for `POST /v1/approvals` — generic submission for any entity type
/// the approval workflow governs, not just `LOADER` (which instead goes
/// through `POST /v1/loaders`'s dedicated draft shape).
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitApprovalRequest {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub draft_json: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectRequest {
    pub justification: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResubmitRequest {
    pub revised_draft: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    pub justification: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequestResponse {
    #[serde(flatten)]
    pub request: ApprovalRequestRow,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalListResponse {
    pub requests: Vec<ApprovalRequestRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalActionsResponse {
    pub actions: Vec<ApprovalActionRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListPendingParams {
    pub entity_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Backfill
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitBackfillRequest {
    pub loader_code: String,
    pub from_time: DateTime<Utc>,
    pub to_time: DateTime<Utc>,
    pub purge_strategy: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitBackfillResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillJobResponse {
    #[serde(flatten)]
    pub job: BackfillJobRow,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillListResponse {
    pub jobs: Vec<BackfillJobRow>,
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BulkSignalEntry {
    pub segment_code: Option<i64>,
    pub signal_epoch: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkAppendSignalsRequest {
    pub loader_code: String,
    pub signals: Vec<BulkSignalEntry>,
    /// Appends into a window already containing data fail unless explicitly
    /// opted into skip-duplicates semantics; mirrors `PurgeStrategy`'s
    /// distinction between `FAIL_ON_DUPLICATE` and `SKIP_DUPLICATES`.
    #[serde(default)]
    pub skip_duplicates: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkAppendSignalsResponse {
    pub written: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySignalsParams {
    pub loader_code: String,
    pub from_epoch: i64,
    pub to_epoch: i64,
    pub segment_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppendSignalRequest {
    pub loader_code: String,
    pub segment_code: Option<i64>,
    pub signal_epoch: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuerySignalsResponse {
    pub signals: Vec<SignalRow>,
}
