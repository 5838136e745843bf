//! Shared runtime state for etl-daemon.
//!
//! All types here are `Clone`-able (via `Arc`). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::sync::Arc;
use std::time::Duration;

use etl_approval::{ApprovalWorkflow, LoaderMaterializer};
use etl_backfill::SystemGapScanner;
use etl_backfill::SystemBackfillService;
use etl_crypto::EncryptedFieldCodec;
use etl_lock::SystemLockManager;
use etl_pipeline::ExecutionPipeline;
use etl_scheduler::SystemLoaderScheduler;
use etl_sources::SourceRegistry;
use etl_types::{EventBus, JwtValidator, MetricsSink};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, serde::Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub control_db: PgPool,
    pub source_registry: Arc<SourceRegistry>,
    pub codec: Arc<EncryptedFieldCodec>,
    pub pipeline: Arc<ExecutionPipeline>,
    pub lock_manager: Arc<SystemLockManager>,
    pub scheduler: Arc<SystemLoaderScheduler>,
    pub backfill: Arc<SystemBackfillService>,
    pub gap_scanner: Arc<SystemGapScanner>,
    pub approval: Arc<ApprovalWorkflow>,
    pub materializer: Arc<LoaderMaterializer>,
    pub jwt_validator: Arc<dyn JwtValidator>,
    pub metrics: Arc<dyn MetricsSink>,
    pub event_bus: Arc<dyn EventBus>,
    pub build: BuildInfo,
    pub replica_name: String,
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Replica identity chain (§6): `HOSTNAME` → `COMPUTERNAME` → the OS's own
/// hostname lookup → a fixed fallback. Every replica sharing the control
/// database needs a stable name for lock ownership and backfill attribution,
/// but none of these sources is guaranteed present across every deployment
/// target, hence the chain instead of trusting one.
pub fn resolve_replica_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            gethostname::gethostname()
                .into_string()
                .ok()
                .filter(|s| !s.trim().is_empty())
        })
        .unwrap_or_else(|| "unknown-replica".to_string())
}

/// Spawn a background task that runs `GapScanner::scan_for_gaps` every
/// `interval` — mirrors `spawn_heartbeat`'s `tokio::time::interval` +
/// `tokio::spawn` shape, generalized to a fallible unit of work.
pub fn spawn_gap_scan(gap_scanner: Arc<SystemGapScanner>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match gap_scanner.scan_for_gaps().await {
                Ok(submitted) if submitted > 0 => tracing::info!(submitted, "daemon/gap-scan-complete"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "daemon/gap-scan-failed"),
            }
        }
    })
}

/// Spawn a background task that physically deletes released locks past
/// their retention window every `interval` — the only periodic physical
/// delete the control plane performs.
pub fn spawn_lock_retention(lock_manager: Arc<SystemLockManager>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match lock_manager.delete_retained().await {
                Ok(deleted) if deleted > 0 => tracing::info!(deleted, "daemon/lock-retention-complete"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "daemon/lock-retention-failed"),
            }
        }
    })
}

/// Spawn a background task that promotes `APPROVED` LOADER CREATE requests
/// into materialized loaders every `interval`.
pub fn spawn_materializer(materializer: Arc<LoaderMaterializer>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match materializer.run_once().await {
                Ok(n) if n > 0 => tracing::info!(materialized = n, "daemon/materializer-complete"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "daemon/materializer-failed"),
            }
        }
    })
}

/// Spawn a background task that executes every `PENDING` backfill job once
/// per `interval`. §6 exposes only submit/get/list/cancel over HTTP —
/// `execute` has no endpoint of its own, so something has to drive the
/// PENDING→RUNNING transition; this is that driver, one poll loop per
/// replica racing the same `start_backfill_job` guard C8 already uses to
/// decide who wins. Takes its own pool handle (rather than reaching into
/// `BackfillService`, which keeps its pool private) the same way `main.rs`
/// hands every background task the collaborator it needs directly.
pub fn spawn_backfill_executor(
    control_db: PgPool,
    backfill: Arc<SystemBackfillService>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let pending = match etl_db::list_backfill_jobs_by_status(&control_db, "PENDING").await {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::error!(error = %e, "daemon/backfill-poll-failed");
                    continue;
                }
            };
            for job in pending {
                if let Err(e) = backfill.execute(job.id).await {
                    tracing::warn!(job_id = %job.id, error = %e, "daemon/backfill-execute-failed");
                }
            }
        }
    })
}
