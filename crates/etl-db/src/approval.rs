use crate::loaders::{set_version_status, LoaderRow};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApprovalRequestRow {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub status: String,
    pub submitted_by: String,
    pub draft_json: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApprovalActionRow {
    pub id: Uuid,
    pub approval_request_id: Uuid,
    pub action_type: String,
    pub actor: String,
    pub previous_status: Option<String>,
    pub new_status: String,
    pub comment: Option<String>,
    pub acted_at: DateTime<Utc>,
}

const REQUEST_COLUMNS: &str =
    "id, entity_type, entity_id, status, submitted_by, draft_json, created_at, updated_at";
const ACTION_COLUMNS: &str =
    "id, approval_request_id, action_type, actor, previous_status, new_status, comment, acted_at";

/// C6 `submit`: at most one `PENDING_APPROVAL` request per entity (unique
/// index on `(entity_type, entity_id) WHERE status = 'PENDING_APPROVAL'`) —
/// a second concurrent submit surfaces as a unique-violation the caller maps
/// to `Conflict`.
pub async fn insert_approval_request(
    pool: &PgPool,
    id: Uuid,
    entity_type: &str,
    entity_id: Uuid,
    submitted_by: &str,
    draft_json: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO approval_requests (id, entity_type, entity_id, status, submitted_by, draft_json)
        VALUES ($1, $2, $3, 'PENDING_APPROVAL', $4, $5)
        "#,
    )
    .bind(id)
    .bind(entity_type)
    .bind(entity_id)
    .bind(submitted_by)
    .bind(draft_json)
    .execute(pool)
    .await
    .context("insert_approval_request failed")?;
    Ok(())
}

pub async fn get_approval_request_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ApprovalRequestRow>> {
    sqlx::query_as::<_, ApprovalRequestRow>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM approval_requests WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("get_approval_request_by_id failed")
}

/// Transition a request's `status` and, on a `RESUBMIT` carrying a revised
/// payload, its `draft_json`. `None` leaves the existing payload untouched.
/// Generic over `PgPool` or an open transaction so `ApprovalWorkflow` can run
/// this alongside the action append and any loader-version mutation within
/// one transaction.
pub async fn update_approval_request_status<'e, E>(
    executor: E,
    id: Uuid,
    new_status: &str,
    draft_json: Option<&Value>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    match draft_json {
        Some(json) => {
            sqlx::query(
                "UPDATE approval_requests SET status = $2, draft_json = $3, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(new_status)
            .bind(json)
            .execute(executor)
            .await
        }
        None => {
            sqlx::query("UPDATE approval_requests SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(new_status)
                .execute(executor)
                .await
        }
    }
    .context("update_approval_request_status failed")?;
    Ok(())
}

/// All requests ever submitted for one entity, newest first — the "history
/// for entity" endpoint (§6).
pub async fn list_requests_for_entity(
    pool: &PgPool,
    entity_type: &str,
    entity_id: Uuid,
) -> Result<Vec<ApprovalRequestRow>> {
    sqlx::query_as::<_, ApprovalRequestRow>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM approval_requests WHERE entity_type = $1 AND entity_id = $2 ORDER BY created_at DESC"
    ))
    .bind(entity_type)
    .bind(entity_id)
    .fetch_all(pool)
    .await
    .context("list_requests_for_entity failed")
}

pub async fn list_pending_approval_requests(
    pool: &PgPool,
    entity_type: Option<&str>,
) -> Result<Vec<ApprovalRequestRow>> {
    sqlx::query_as::<_, ApprovalRequestRow>(&format!(
        r#"
        SELECT {REQUEST_COLUMNS} FROM approval_requests
        WHERE status = 'PENDING_APPROVAL' AND ($1::text IS NULL OR entity_type = $1)
        ORDER BY created_at
        "#
    ))
    .bind(entity_type)
    .fetch_all(pool)
    .await
    .context("list_pending_approval_requests failed")
}

/// `APPROVED` `LOADER` requests the materializer hasn't yet turned into a
/// real `loaders` row — the CREATE path only; an UPDATE's `entityId` already
/// names a live loader, so it never matches this query (see
/// `etl-approval`'s materializer for why that's the dispatch signal).
pub async fn list_unmaterialized_loader_create_requests(pool: &PgPool) -> Result<Vec<ApprovalRequestRow>> {
    sqlx::query_as::<_, ApprovalRequestRow>(&format!(
        r#"
        SELECT {REQUEST_COLUMNS} FROM approval_requests r
        WHERE r.entity_type = 'LOADER' AND r.status = 'APPROVED'
          AND NOT EXISTS (SELECT 1 FROM loaders l WHERE l.id = r.entity_id)
        ORDER BY r.created_at
        "#
    ))
    .fetch_all(pool)
    .await
    .context("list_unmaterialized_loader_create_requests failed")
}

/// Approval actions for one request are linearizable (§5): every action is
/// appended to this append-only log, never updated in place. Generic over
/// `PgPool` or an open transaction for the same reason as
/// `update_approval_request_status`.
#[allow(clippy::too_many_arguments)]
pub async fn insert_approval_action<'e, E>(
    executor: E,
    id: Uuid,
    approval_request_id: Uuid,
    action_type: &str,
    actor: &str,
    previous_status: Option<&str>,
    new_status: &str,
    comment: Option<&str>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(&format!(
        r#"
        INSERT INTO approval_actions ({ACTION_COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, now())
        "#
    ))
    .bind(id)
    .bind(approval_request_id)
    .bind(action_type)
    .bind(actor)
    .bind(previous_status)
    .bind(new_status)
    .bind(comment)
    .execute(executor)
    .await
    .context("insert_approval_action failed")?;
    Ok(())
}

pub async fn list_actions_for_request(pool: &PgPool, approval_request_id: Uuid) -> Result<Vec<ApprovalActionRow>> {
    sqlx::query_as::<_, ApprovalActionRow>(&format!(
        "SELECT {ACTION_COLUMNS} FROM approval_actions WHERE approval_request_id = $1 ORDER BY acted_at"
    ))
    .bind(approval_request_id)
    .fetch_all(pool)
    .await
    .context("list_actions_for_request failed")
}

/// C7 `VersioningArchive`: takes an immutable snapshot of a loader version
/// as it leaves DRAFT/ACTIVE. Archive rows are never updated or deleted.
/// `pub(crate)`: loader-mutation entry points are only reachable through
/// `ApprovalWorkflow`'s transactional methods (`promote_update`, `reject`,
/// `archive_active_version`), which live in this crate; no other crate
/// should take a dependency on the raw primitive.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn archive_loader_version<'e, E>(
    executor: E,
    archive_id: Uuid,
    loader_id: Uuid,
    loader_code: &str,
    version_number: i32,
    version_status_at_archive: &str,
    snapshot_json: &Value,
    archived_by: Option<&str>,
    archive_reason: Option<&str>,
    rejected_by: Option<&str>,
    rejection_reason: Option<&str>,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let rejected_at = rejected_by.map(|_| Utc::now());
    sqlx::query(
        r#"
        INSERT INTO loader_archive (
            id, loader_id, loader_code, version_number, version_status_at_archive,
            snapshot_json, archived_by, archive_reason, rejected_by, rejected_at, rejection_reason
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(archive_id)
    .bind(loader_id)
    .bind(loader_code)
    .bind(version_number)
    .bind(version_status_at_archive)
    .bind(snapshot_json)
    .bind(archived_by)
    .bind(archive_reason)
    .bind(rejected_by)
    .bind(rejected_at)
    .bind(rejection_reason)
    .execute(executor)
    .await
    .context("archive_loader_version failed")?;
    Ok(())
}

/// Archives `active`'s current version as `ARCHIVED` and promotes `draft_id`
/// to `ACTIVE`/`APPROVED`, all within the caller's transaction — the §9
/// atomic "approval transition + action append + archival move" requirement.
/// Called by `ApprovalWorkflow::approve` with the same transaction it used
/// for the request status update and action append, so a crash partway
/// through never leaves a loader with no `ACTIVE` version.
#[allow(clippy::too_many_arguments)]
pub async fn promote_loader_version(
    tx: &mut Transaction<'_, Postgres>,
    archive_id: Uuid,
    active: &LoaderRow,
    snapshot_json: &Value,
    approved_by: &str,
    draft_id: Uuid,
) -> Result<()> {
    archive_loader_version(
        &mut **tx,
        archive_id,
        active.id,
        &active.loader_code,
        active.version_number,
        "ARCHIVED",
        snapshot_json,
        Some(approved_by),
        Some("superseded by approved update"),
        None,
        None,
    )
    .await?;
    set_version_status(&mut **tx, active.id, "ARCHIVED", active.approval_status.as_str(), false).await?;
    set_version_status(&mut **tx, draft_id, "ACTIVE", "APPROVED", true).await?;
    Ok(())
}

/// Archives a rejected `draft` version and marks it `REJECTED`, within the
/// caller's transaction. Called by `ApprovalWorkflow::reject`.
pub async fn archive_rejected_draft(
    tx: &mut Transaction<'_, Postgres>,
    archive_id: Uuid,
    draft: &LoaderRow,
    snapshot_json: &Value,
    rejected_by: &str,
    rejection_reason: &str,
) -> Result<()> {
    archive_loader_version(
        &mut **tx,
        archive_id,
        draft.id,
        &draft.loader_code,
        draft.version_number,
        "REJECTED",
        snapshot_json,
        None,
        None,
        Some(rejected_by),
        Some(rejection_reason),
    )
    .await?;
    set_version_status(&mut **tx, draft.id, "REJECTED", "REJECTED", false).await?;
    Ok(())
}

/// Archives `active`'s current version as `ARCHIVED` with no promotion —
/// the loader-deletion path. Called by `ApprovalWorkflow::archive_active_version`
/// so `etl-daemon` never has to call `archive_loader_version`/`set_version_status`
/// directly.
pub async fn retire_loader_version(
    tx: &mut Transaction<'_, Postgres>,
    archive_id: Uuid,
    active: &LoaderRow,
    actor: &str,
    reason: &str,
) -> Result<()> {
    let snapshot = serde_json::to_value(active)
        .with_context(|| format!("failed to snapshot loader {}", active.id))?;
    archive_loader_version(
        &mut **tx,
        archive_id,
        active.id,
        &active.loader_code,
        active.version_number,
        "ARCHIVED",
        &snapshot,
        Some(actor),
        Some(reason),
        None,
        None,
    )
    .await?;
    set_version_status(&mut **tx, active.id, "ARCHIVED", active.approval_status.as_str(), false).await?;
    Ok(())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArchivedVersionRow {
    pub id: Uuid,
    pub loader_id: Uuid,
    pub loader_code: String,
    pub version_number: i32,
    pub version_status_at_archive: String,
    pub snapshot_json: Value,
    pub archived_by: Option<String>,
    pub archive_reason: Option<String>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub archived_at: DateTime<Utc>,
}

pub async fn list_archive_for_loader_code(pool: &PgPool, loader_code: &str) -> Result<Vec<ArchivedVersionRow>> {
    sqlx::query_as::<_, ArchivedVersionRow>(
        r#"
        SELECT id, loader_id, loader_code, version_number, version_status_at_archive,
               snapshot_json, archived_by, archive_reason, rejected_by, rejected_at,
               rejection_reason, archived_at
        FROM loader_archive
        WHERE loader_code = $1
        ORDER BY version_number
        "#,
    )
    .bind(loader_code)
    .fetch_all(pool)
    .await
    .context("list_archive_for_loader_code failed")
}
