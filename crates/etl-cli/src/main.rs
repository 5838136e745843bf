mod commands;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "etl-cli")]
#[command(about = "ETL control-plane operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Control-plane database lifecycle
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute a layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> local -> ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Inspect loaders (read-only; mutation goes through `approval`)
    Loader {
        #[command(subcommand)]
        cmd: LoaderCmd,
    },

    /// Approval workflow (C6)
    Approval {
        #[command(subcommand)]
        cmd: ApprovalCmd,
    },

    /// On-demand backfill jobs (C8)
    Backfill {
        #[command(subcommand)]
        cmd: BackfillCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum LoaderCmd {
    /// List every enabled loader
    List,
    /// Show a single loader's current version
    Get { loader_code: String },
    /// Show aggregate run counters for a loader
    Stats { loader_code: String },
}

#[derive(Subcommand)]
enum ApprovalCmd {
    /// List pending approval requests
    List {
        #[arg(long)]
        entity_type: Option<String>,
    },
    /// Show one approval request
    Get { request_id: Uuid },
    /// Approve a pending request
    Approve {
        request_id: Uuid,
        #[arg(long, default_value_t = default_actor())]
        actor: String,
    },
    /// Reject a pending request
    Reject {
        request_id: Uuid,
        #[arg(long)]
        justification: String,
        #[arg(long, default_value_t = default_actor())]
        actor: String,
    },
    /// Resubmit a rejected request unchanged
    Resubmit {
        request_id: Uuid,
        #[arg(long, default_value_t = default_actor())]
        actor: String,
    },
    /// Revoke an approved request
    Revoke {
        request_id: Uuid,
        #[arg(long)]
        justification: String,
        #[arg(long, default_value_t = default_actor())]
        actor: String,
    },
    /// Materialize every approved CREATE/UPDATE request into real loaders
    Materialize,
}

#[derive(Subcommand)]
enum BackfillCmd {
    /// Submit a new backfill job
    Submit {
        #[arg(long)]
        loader_code: String,
        #[arg(long)]
        from_time: DateTime<Utc>,
        #[arg(long)]
        to_time: DateTime<Utc>,
        #[arg(long)]
        purge_strategy: Option<String>,
        #[arg(long, default_value_t = default_actor())]
        requested_by: String,
    },
    /// Cancel a still-pending backfill job
    Cancel { job_id: Uuid },
    /// Show one backfill job
    Get { job_id: Uuid },
    /// List backfill jobs for a loader
    List { loader_code: String },
}

fn default_actor() -> String {
    std::env::var("USER").unwrap_or_else(|_| "operator".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = etl_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => commands::db::status(&pool).await?,
                DbCmd::Migrate => commands::db::migrate(&pool).await?,
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = etl_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Loader { cmd } => {
            let pool = etl_db::connect_from_env().await?;
            match cmd {
                LoaderCmd::List => commands::loader::list(&pool).await?,
                LoaderCmd::Get { loader_code } => commands::loader::get(&pool, &loader_code).await?,
                LoaderCmd::Stats { loader_code } => commands::loader::stats(&pool, &loader_code).await?,
            }
        }

        Commands::Approval { cmd } => {
            let collaborators = commands::boot().await?;
            match cmd {
                ApprovalCmd::List { entity_type } => {
                    commands::approval::list(&collaborators.approval, entity_type.as_deref()).await?
                }
                ApprovalCmd::Get { request_id } => commands::approval::get(&collaborators.approval, request_id).await?,
                ApprovalCmd::Approve { request_id, actor } => {
                    commands::approval::approve(&collaborators.approval, request_id, &actor).await?
                }
                ApprovalCmd::Reject { request_id, justification, actor } => {
                    commands::approval::reject(&collaborators.approval, request_id, &actor, &justification).await?
                }
                ApprovalCmd::Resubmit { request_id, actor } => {
                    commands::approval::resubmit(&collaborators.approval, request_id, &actor).await?
                }
                ApprovalCmd::Revoke { request_id, justification, actor } => {
                    commands::approval::revoke(&collaborators.approval, request_id, &actor, &justification).await?
                }
                ApprovalCmd::Materialize => commands::approval::materialize(&collaborators.materializer).await?,
            }
        }

        Commands::Backfill { cmd } => {
            let collaborators = commands::boot().await?;
            match cmd {
                BackfillCmd::Submit { loader_code, from_time, to_time, purge_strategy, requested_by } => {
                    commands::backfill::submit(
                        &collaborators.backfill,
                        &loader_code,
                        from_time,
                        to_time,
                        purge_strategy.as_deref(),
                        &requested_by,
                    )
                    .await?
                }
                BackfillCmd::Cancel { job_id } => commands::backfill::cancel(&collaborators.backfill, job_id).await?,
                BackfillCmd::Get { job_id } => commands::backfill::get(&collaborators.backfill, job_id).await?,
                BackfillCmd::List { loader_code } => commands::backfill::list(&collaborators.backfill, &loader_code).await?,
            }
        }
    }

    Ok(())
}
