//! `etl-cli loader` — read-only inspection of loader state.
//!
//! Loader mutation (create/update/delete) goes through the approval
//! workflow exclusively; see `commands::approval`.

use anyhow::{Context, Result};
use sqlx::PgPool;

pub async fn list(pool: &PgPool) -> Result<()> {
    let loaders = etl_db::list_enabled_loaders(pool).await?;
    for l in &loaders {
        println!(
            "loader_code={} version_status={} approval_status={} enabled={}",
            l.loader_code, l.version_status, l.approval_status, l.enabled
        );
    }
    println!("count={}", loaders.len());
    Ok(())
}

pub async fn get(pool: &PgPool, loader_code: &str) -> Result<()> {
    let l = etl_db::get_active_loader(pool, loader_code)
        .await?
        .with_context(|| format!("no active loader {loader_code}"))?;
    println!("loader_code={}", l.loader_code);
    println!("version_status={}", l.version_status);
    println!("approval_status={}", l.approval_status);
    println!("enabled={}", l.enabled);
    println!("min_interval_seconds={}", l.min_interval_seconds);
    println!("max_interval_seconds={}", l.max_interval_seconds);
    println!("purge_strategy={}", l.purge_strategy);
    println!("load_status={}", l.load_status);
    println!("consecutive_zero_record_runs={}", l.consecutive_zero_record_runs);
    Ok(())
}

pub async fn stats(pool: &PgPool, loader_code: &str) -> Result<()> {
    let s = etl_db::loader_stats(pool, loader_code).await?;
    println!("loader_code={loader_code}");
    println!("total_runs={}", s.total_runs);
    println!("success_runs={}", s.success_runs);
    println!("partial_runs={}", s.partial_runs);
    println!("failed_runs={}", s.failed_runs);
    println!("total_records_ingested={}", s.total_records_ingested);
    println!("last_status={}", s.last_status.as_deref().unwrap_or(""));
    Ok(())
}
