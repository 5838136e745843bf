//! `etl-cli backfill` — on-demand time-range reloads (C8).

use anyhow::Result;
use chrono::{DateTime, Utc};
use etl_backfill::SystemBackfillService;
use uuid::Uuid;

pub async fn submit(
    backfill: &SystemBackfillService,
    loader_code: &str,
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
    purge_strategy: Option<&str>,
    requested_by: &str,
) -> Result<()> {
    let job_id = backfill.submit(loader_code, from_time, to_time, purge_strategy, requested_by).await?;
    println!("job_id={job_id}");
    Ok(())
}

pub async fn cancel(backfill: &SystemBackfillService, job_id: Uuid) -> Result<()> {
    backfill.cancel(job_id).await?;
    println!("cancelled=true job_id={job_id}");
    Ok(())
}

pub async fn get(backfill: &SystemBackfillService, job_id: Uuid) -> Result<()> {
    let job = backfill.get(job_id).await?;
    println!("job_id={}", job.id);
    println!("loader_code={}", job.loader_code);
    println!("status={}", job.status);
    println!("window_start={}", job.window_start.to_rfc3339());
    println!("window_end={}", job.window_end.to_rfc3339());
    println!("requested_by={}", job.requested_by);
    Ok(())
}

pub async fn list(backfill: &SystemBackfillService, loader_code: &str) -> Result<()> {
    let jobs = backfill.list_for_loader(loader_code).await?;
    for j in &jobs {
        println!(
            "job_id={} status={} window_start={} window_end={}",
            j.id, j.status, j.window_start.to_rfc3339(), j.window_end.to_rfc3339()
        );
    }
    println!("count={}", jobs.len());
    Ok(())
}
