use etl_db::{ApprovalActionRow, ApprovalRequestRow, ArchivedVersionRow, LoaderRow};
use etl_types::EtlError;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// C6 ApprovalWorkflow: a generic `(entityType, entityId)` request/action
/// state machine (§4.5). Only `LOADER` has an entity materializer in this
/// core — `DASHBOARD`/`INCIDENT`/`CHART`/`ALERT_RULE` requests move through
/// the same state machine but nothing downstream consumes their approval.
pub struct ApprovalWorkflow {
    pool: PgPool,
}

impl ApprovalWorkflow {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Submit a brand-new entity for approval. `entity_id` becomes the
    /// entity's own identifier once approved and materialized — for
    /// `LOADER` this is the future loader's `id`.
    pub async fn submit(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        submitted_by: &str,
        draft_json: Value,
    ) -> Result<Uuid, EtlError> {
        let request_id = Uuid::new_v4();
        etl_db::insert_approval_request(&self.pool, request_id, entity_type, entity_id, submitted_by, &draft_json)
            .await
            .map_err(|e| map_submit_conflict(e, entity_type, entity_id))?;

        etl_db::insert_approval_action(
            &self.pool,
            Uuid::new_v4(),
            request_id,
            "SUBMIT",
            submitted_by,
            None,
            "PENDING_APPROVAL",
            None,
        )
        .await?;

        tracing::info!(request_id = %request_id, entity_type, entity_id = %entity_id, "approval/submit");
        Ok(request_id)
    }

    /// Submit an UPDATE to an already-`ACTIVE` loader. The caller has
    /// already inserted the new `DRAFT` version row (via
    /// `etl_db::insert_loader_draft`, `parent_version_id = Some(active_loader_id)`)
    /// — this just opens the approval request that gates its promotion.
    pub async fn submit_loader_update(
        &self,
        active_loader_id: Uuid,
        new_draft_loader_id: Uuid,
        submitted_by: &str,
    ) -> Result<Uuid, EtlError> {
        let payload = serde_json::json!({ "new_version_loader_id": new_draft_loader_id });
        self.submit("LOADER", active_loader_id, submitted_by, payload).await
    }

    /// `PENDING_APPROVAL` → `APPROVED`. For `LOADER` requests whose
    /// `entityId` already names a live loader (an UPDATE), this
    /// synchronously archives the current `ACTIVE` row and promotes the new
    /// draft — all the information needed is already resolvable. A CREATE
    /// request (no live loader yet) is left for the periodic materializer,
    /// matching §4.5's "idempotent, re-running is a no-op" description.
    ///
    /// The whole sequence — request-status transition, action append, and
    /// (for an UPDATE) the archive-and-promote — runs inside one transaction
    /// so a crash partway through never leaves the approval marked APPROVED
    /// with the promotion half-applied (§9).
    pub async fn approve(&self, request_id: Uuid, actor: &str) -> Result<(), EtlError> {
        let request = self.require_pending(request_id).await?;

        let mut tx = self.pool.begin().await?;

        etl_db::update_approval_request_status(&mut *tx, request_id, "APPROVED", None).await?;
        etl_db::insert_approval_action(
            &mut *tx,
            Uuid::new_v4(),
            request_id,
            "APPROVE",
            actor,
            Some("PENDING_APPROVAL"),
            "APPROVED",
            None,
        )
        .await?;

        if request.entity_type == "LOADER" {
            if let Some(active) = etl_db::get_loader_by_id(&mut *tx, request.entity_id).await? {
                self.promote_update(&mut tx, &request, &active, actor).await?;
            }
        }

        tx.commit().await?;

        tracing::info!(request_id = %request_id, actor, "approval/approve");
        Ok(())
    }

    async fn promote_update(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        request: &ApprovalRequestRow,
        active: &LoaderRow,
        actor: &str,
    ) -> Result<(), EtlError> {
        let new_draft_id = extract_new_version_id(&request.draft_json)?;
        let draft = etl_db::get_loader_by_id(&mut **tx, new_draft_id)
            .await?
            .ok_or_else(|| EtlError::NotFound(format!("draft loader version {new_draft_id} not found")))?;
        if draft.version_status != "DRAFT" || draft.parent_version_id != Some(active.id) {
            return Err(EtlError::IllegalState(format!(
                "loader {new_draft_id} is not a pending draft of {}",
                active.id
            )));
        }

        let snapshot = serde_json::to_value(active)
            .map_err(|e| EtlError::Internal(format!("failed to snapshot loader {}: {e}", active.id)))?;
        etl_db::promote_loader_version(tx, Uuid::new_v4(), active, &snapshot, actor, draft.id).await?;

        tracing::info!(
            loader_code = %active.loader_code,
            archived_version = active.version_number,
            new_version = draft.version_number,
            "approval/loader-version-promoted"
        );
        Ok(())
    }

    /// `PENDING_APPROVAL` → `REJECTED`. A rejected UPDATE's draft row is
    /// archived with the rejection trail preserved; a rejected CREATE never
    /// had a physical `loaders` row to archive. Runs as one transaction for
    /// the same reason `approve` does (§9).
    pub async fn reject(&self, request_id: Uuid, actor: &str, justification: &str) -> Result<(), EtlError> {
        if justification.trim().is_empty() {
            return Err(EtlError::Validation("reject requires a non-empty justification".to_string()));
        }
        let request = self.require_pending(request_id).await?;

        let mut tx = self.pool.begin().await?;

        etl_db::update_approval_request_status(&mut *tx, request_id, "REJECTED", None).await?;
        etl_db::insert_approval_action(
            &mut *tx,
            Uuid::new_v4(),
            request_id,
            "REJECT",
            actor,
            Some("PENDING_APPROVAL"),
            "REJECTED",
            Some(justification),
        )
        .await?;

        if request.entity_type == "LOADER" {
            if let Ok(new_draft_id) = extract_new_version_id(&request.draft_json) {
                if let Some(draft) = etl_db::get_loader_by_id(&mut *tx, new_draft_id).await? {
                    let snapshot = serde_json::to_value(&draft)
                        .map_err(|e| EtlError::Internal(format!("failed to snapshot loader {}: {e}", draft.id)))?;
                    etl_db::archive_rejected_draft(&mut tx, Uuid::new_v4(), &draft, &snapshot, actor, justification)
                        .await?;
                }
            }
        }

        tx.commit().await?;

        tracing::info!(request_id = %request_id, actor, "approval/reject");
        Ok(())
    }

    /// Archives the current `ACTIVE` version of a loader with no promotion —
    /// the deletion path. The only way `etl-daemon` retires a loader; it
    /// never calls `etl_db`'s loader-mutation primitives directly, per §3's
    /// "mutated only by the workflow and pipeline under transactions".
    pub async fn archive_active_version(&self, active: &LoaderRow, actor: &str, reason: &str) -> Result<(), EtlError> {
        let mut tx = self.pool.begin().await?;
        etl_db::retire_loader_version(&mut tx, Uuid::new_v4(), active, actor, reason).await?;
        tx.commit().await?;

        tracing::info!(loader_code = %active.loader_code, version = active.version_number, actor, "approval/loader-version-archived");
        Ok(())
    }

    /// `REJECTED` → `PENDING_APPROVAL`, optionally carrying a revised draft.
    pub async fn resubmit(&self, request_id: Uuid, actor: &str, revised_draft: Option<Value>) -> Result<(), EtlError> {
        let request = self.get(request_id).await?;
        if request.status != "REJECTED" {
            return Err(EtlError::IllegalState(format!(
                "request {request_id} is {} not REJECTED",
                request.status
            )));
        }

        etl_db::update_approval_request_status(&self.pool, request_id, "PENDING_APPROVAL", revised_draft.as_ref())
            .await?;
        etl_db::insert_approval_action(
            &self.pool,
            Uuid::new_v4(),
            request_id,
            "RESUBMIT",
            actor,
            Some("REJECTED"),
            "PENDING_APPROVAL",
            None,
        )
        .await?;

        tracing::info!(request_id = %request_id, actor, "approval/resubmit");
        Ok(())
    }

    /// `APPROVED` → `PENDING_APPROVAL`. Reopens the approval record only;
    /// an already-materialized/promoted loader is left running — §4.5 gives
    /// the materializer no instruction to un-wind a live entity on revoke.
    pub async fn revoke(&self, request_id: Uuid, actor: &str, justification: &str) -> Result<(), EtlError> {
        if justification.trim().is_empty() {
            return Err(EtlError::Validation("revoke requires a non-empty justification".to_string()));
        }
        let request = self.get(request_id).await?;
        if request.status != "APPROVED" {
            return Err(EtlError::IllegalState(format!(
                "request {request_id} is {} not APPROVED",
                request.status
            )));
        }

        etl_db::update_approval_request_status(&self.pool, request_id, "PENDING_APPROVAL", None).await?;
        etl_db::insert_approval_action(
            &self.pool,
            Uuid::new_v4(),
            request_id,
            "REVOKE",
            actor,
            Some("APPROVED"),
            "PENDING_APPROVAL",
            Some(justification),
        )
        .await?;

        tracing::info!(request_id = %request_id, actor, "approval/revoke");
        Ok(())
    }

    pub async fn get(&self, request_id: Uuid) -> Result<ApprovalRequestRow, EtlError> {
        etl_db::get_approval_request_by_id(&self.pool, request_id)
            .await?
            .ok_or_else(|| EtlError::NotFound(format!("approval request {request_id} not found")))
    }

    async fn require_pending(&self, request_id: Uuid) -> Result<ApprovalRequestRow, EtlError> {
        let request = self.get(request_id).await?;
        if request.status != "PENDING_APPROVAL" {
            return Err(EtlError::IllegalState(format!(
                "request {request_id} is {} not PENDING_APPROVAL",
                request.status
            )));
        }
        Ok(request)
    }

    pub async fn list_pending(&self, entity_type: Option<&str>) -> Result<Vec<ApprovalRequestRow>, EtlError> {
        Ok(etl_db::list_pending_approval_requests(&self.pool, entity_type).await?)
    }

    pub async fn history_for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<ApprovalRequestRow>, EtlError> {
        Ok(etl_db::list_requests_for_entity(&self.pool, entity_type, entity_id).await?)
    }

    pub async fn actions_for_request(&self, request_id: Uuid) -> Result<Vec<ApprovalActionRow>, EtlError> {
        Ok(etl_db::list_actions_for_request(&self.pool, request_id).await?)
    }

    pub async fn archive_for_loader_code(&self, loader_code: &str) -> Result<Vec<ArchivedVersionRow>, EtlError> {
        Ok(etl_db::list_archive_for_loader_code(&self.pool, loader_code).await?)
    }
}

fn extract_new_version_id(draft_json: &Value) -> Result<Uuid, EtlError> {
    draft_json
        .get("new_version_loader_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| EtlError::Validation("draft_json missing new_version_loader_id".to_string()))
}

fn map_submit_conflict(e: anyhow::Error, entity_type: &str, entity_id: Uuid) -> EtlError {
    let msg = e.to_string();
    if msg.contains("uq_approval_requests_pending_entity") || msg.contains("unique") {
        EtlError::Conflict(format!(
            "a PENDING_APPROVAL request already exists for {entity_type}/{entity_id}"
        ))
    } else {
        EtlError::from(e)
    }
}
