//! Command handler modules for etl-cli.
//!
//! Shared boot-up plumbing used by multiple command paths lives here.
//! Command-specific logic lives in the submodules.

pub mod approval;
pub mod backfill;
pub mod db;
pub mod loader;

use anyhow::{Context, Result};
use etl_approval::{ApprovalWorkflow, LoaderMaterializer};
use etl_backfill::SystemBackfillService;
use etl_crypto::EncryptedFieldCodec;
use etl_pipeline::ExecutionPipeline;
use etl_sources::SourceRegistry;
use sqlx::PgPool;
use std::sync::Arc;

const DEFAULT_CONFIG_PATH: &str = "config/base.yaml";
const LOCAL_CONFIG_PATH: &str = "config/local.yaml";

/// Everything an operator subcommand needs, built the same way
/// `etl-daemon::main` builds its `AppState` collaborators, minus the HTTP
/// server and background schedulers this short-lived process never runs.
pub struct Collaborators {
    pub control_db: PgPool,
    pub approval: ApprovalWorkflow,
    pub materializer: LoaderMaterializer,
    pub backfill: SystemBackfillService,
}

pub async fn boot() -> Result<Collaborators> {
    let config_paths: Vec<&str> = [DEFAULT_CONFIG_PATH, LOCAL_CONFIG_PATH]
        .into_iter()
        .filter(|p| std::path::Path::new(p).exists())
        .collect();
    let config = etl_config::load_layered_yaml(&config_paths).context("loading boot config")?;
    let secrets = etl_config::resolve_secrets(&config.config_json).context("resolving secrets")?;

    let control_db = etl_db::connect(&secrets.control_db_url)
        .await
        .context("connecting to control-plane database")?;

    let codec = Arc::new(EncryptedFieldCodec::new(&secrets.encryption_key).context("building field codec")?);
    let source_registry = Arc::new(
        SourceRegistry::load(control_db.clone(), Arc::clone(&codec))
            .await
            .context("loading source registry")?,
    );
    let pipeline = Arc::new(ExecutionPipeline::new(control_db.clone(), source_registry, codec));

    let replica_name = resolve_replica_name();
    Ok(Collaborators {
        approval: ApprovalWorkflow::new(control_db.clone()),
        materializer: LoaderMaterializer::new(control_db.clone()),
        backfill: SystemBackfillService::new_system(control_db.clone(), pipeline, replica_name),
        control_db,
    })
}

/// Mirrors `etl-daemon::state::resolve_replica_name` for the submitted_by
/// tag on CLI-initiated backfill jobs — the CLI isn't a long-lived replica,
/// but jobs it submits are still attributed to the host that requested them.
fn resolve_replica_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "etl-cli".to_string())
}
