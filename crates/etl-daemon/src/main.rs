//! etl-daemon entry point.
//!
//! This file is intentionally thin: it loads the layered boot config,
//! resolves secrets, builds every collaborator in `AppState`, spawns the
//! background tasks, wires middleware, and starts the HTTP server. All route
//! handlers live in `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use etl_approval::{ApprovalWorkflow, LoaderMaterializer};
use etl_backfill::{SystemBackfillService, SystemGapScanner};
use etl_crypto::EncryptedFieldCodec;
use etl_daemon::{routes, state};
use etl_lock::SystemLockManager;
use etl_pipeline::ExecutionPipeline;
use etl_scheduler::SystemLoaderScheduler;
use etl_sources::SourceRegistry;
use etl_types::{NoopEventBus, NoopMetricsSink};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

const DEFAULT_CONFIG_PATH: &str = "config/base.yaml";
const LOCAL_CONFIG_PATH: &str = "config/local.yaml";
const DEFAULT_WORKER_POOL_SIZE: u64 = 8;
const DEFAULT_GAP_SCAN_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const DEFAULT_LOCK_RETENTION_SWEEP: Duration = Duration::from_secs(60 * 60);
const DEFAULT_MATERIALIZER_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_BACKFILL_EXECUTOR_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_paths: Vec<&str> = [DEFAULT_CONFIG_PATH, LOCAL_CONFIG_PATH]
        .into_iter()
        .filter(|p| std::path::Path::new(p).exists())
        .collect();
    let config = etl_config::load_layered_yaml(&config_paths).context("loading boot config")?;
    let secrets = etl_config::resolve_secrets(&config.config_json).context("resolving secrets")?;

    let control_db = etl_db::connect(&secrets.control_db_url)
        .await
        .context("connecting to control-plane database")?;
    etl_db::migrate(&control_db).await.context("running control-plane migrations")?;

    let codec = Arc::new(EncryptedFieldCodec::new(&secrets.encryption_key).context("building field codec")?);
    let source_registry = Arc::new(
        SourceRegistry::load(control_db.clone(), Arc::clone(&codec))
            .await
            .context("loading source registry")?,
    );

    let pipeline = Arc::new(ExecutionPipeline::new(
        control_db.clone(),
        Arc::clone(&source_registry),
        Arc::clone(&codec),
    ));

    let replica_name = state::resolve_replica_name();

    let lock_manager = Arc::new(SystemLockManager::new_system(control_db.clone()));
    let worker_pool_size = config.u64_at("/scheduler/worker-pool-size", DEFAULT_WORKER_POOL_SIZE) as usize;
    let scheduler = Arc::new(SystemLoaderScheduler::new_system(
        control_db.clone(),
        Arc::clone(&lock_manager),
        Arc::clone(&pipeline),
        replica_name.clone(),
        worker_pool_size,
    ));

    let backfill = Arc::new(SystemBackfillService::new_system(
        control_db.clone(),
        Arc::clone(&pipeline),
        replica_name.clone(),
    ));
    let gap_scanner = Arc::new(SystemGapScanner::new_system(control_db.clone(), Arc::clone(&backfill)));

    let approval = Arc::new(ApprovalWorkflow::new(control_db.clone()));
    let materializer = Arc::new(LoaderMaterializer::new(control_db.clone()));

    let jwt_validator = Arc::new(etl_daemon::auth_shared_secret::SharedSecretValidator::from_env());

    let shared = Arc::new(state::AppState {
        control_db: control_db.clone(),
        source_registry,
        codec,
        pipeline,
        lock_manager: Arc::clone(&lock_manager),
        scheduler: Arc::clone(&scheduler),
        backfill: Arc::clone(&backfill),
        gap_scanner: Arc::clone(&gap_scanner),
        approval,
        materializer: Arc::clone(&materializer),
        jwt_validator,
        metrics: Arc::new(NoopMetricsSink),
        event_bus: Arc::new(NoopEventBus),
        build: state::BuildInfo {
            service: "etl-daemon",
            version: env!("CARGO_PKG_VERSION"),
        },
        replica_name,
    });

    let polling_interval = Duration::from_secs(config.u64_at(
        "/scheduler/polling-interval-seconds",
        etl_scheduler::DEFAULT_POLLING_INTERVAL.as_secs(),
    ));
    scheduler.spawn_periodic(polling_interval);
    state::spawn_gap_scan(gap_scanner, DEFAULT_GAP_SCAN_INTERVAL);
    state::spawn_lock_retention(lock_manager, DEFAULT_LOCK_RETENTION_SWEEP);
    state::spawn_materializer(materializer, DEFAULT_MATERIALIZER_INTERVAL);
    state::spawn_backfill_executor(control_db, backfill, DEFAULT_BACKFILL_EXECUTOR_INTERVAL);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_from_config(&config));

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8899)));
    info!(%addr, replica_name = %shared.replica_name, "etl-daemon listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("ETL_DAEMON_ADDR").ok()?.parse().ok()
}

fn cors_from_config(config: &etl_config::LoadedConfig) -> CorsLayer {
    let raw = config.str_at("/http/cors-allowed-origins", "");
    let origins: Vec<HeaderValue> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(tower_http::cors::Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(tower_http::cors::Any)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async { tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("etl-daemon shutting down");
}
