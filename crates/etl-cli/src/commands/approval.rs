//! `etl-cli approval` — drive the C6 approval state machine by hand.
//!
//! The loader materializer has no HTTP endpoint of its own (§6); `materialize`
//! is the only way an operator turns an approved CREATE request into a real
//! loader without waiting for the next scheduled sweep.

use anyhow::{Context, Result};
use etl_approval::{ApprovalWorkflow, LoaderMaterializer};
use uuid::Uuid;

pub async fn list(workflow: &ApprovalWorkflow, entity_type: Option<&str>) -> Result<()> {
    let pending = workflow.list_pending(entity_type).await?;
    for r in &pending {
        println!(
            "id={} entity_type={} entity_id={} status={} submitted_by={}",
            r.id, r.entity_type, r.entity_id, r.status, r.submitted_by
        );
    }
    println!("count={}", pending.len());
    Ok(())
}

pub async fn get(workflow: &ApprovalWorkflow, request_id: Uuid) -> Result<()> {
    let r = workflow.get(request_id).await?;
    println!("id={}", r.id);
    println!("entity_type={}", r.entity_type);
    println!("entity_id={}", r.entity_id);
    println!("status={}", r.status);
    println!("submitted_by={}", r.submitted_by);
    println!("created_at={}", r.created_at.to_rfc3339());
    Ok(())
}

pub async fn approve(workflow: &ApprovalWorkflow, request_id: Uuid, actor: &str) -> Result<()> {
    workflow.approve(request_id, actor).await?;
    println!("approved=true id={request_id} actor={actor}");
    Ok(())
}

pub async fn reject(workflow: &ApprovalWorkflow, request_id: Uuid, actor: &str, justification: &str) -> Result<()> {
    let justification = justification.trim();
    anyhow::ensure!(!justification.is_empty(), "--justification must not be empty");
    workflow.reject(request_id, actor, justification).await?;
    println!("rejected=true id={request_id} actor={actor}");
    Ok(())
}

pub async fn resubmit(workflow: &ApprovalWorkflow, request_id: Uuid, actor: &str) -> Result<()> {
    workflow.resubmit(request_id, actor, None).await?;
    println!("resubmitted=true id={request_id} actor={actor}");
    Ok(())
}

pub async fn revoke(workflow: &ApprovalWorkflow, request_id: Uuid, actor: &str, justification: &str) -> Result<()> {
    let justification = justification.trim();
    anyhow::ensure!(!justification.is_empty(), "--justification must not be empty");
    workflow.revoke(request_id, actor, justification).await?;
    println!("revoked=true id={request_id} actor={actor}");
    Ok(())
}

pub async fn materialize(materializer: &LoaderMaterializer) -> Result<()> {
    let n = materializer.run_once().await.context("materializer run failed")?;
    println!("materialized={n}");
    Ok(())
}
