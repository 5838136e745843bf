//! End-to-end exercise of the operator CLI against a real control-plane
//! database: submit a loader draft via the approval workflow directly (the
//! CLI has no `loader create` of its own — drafts are submitted through
//! `etl-daemon`'s HTTP surface in production), approve it, materialize it,
//! then submit and cancel a backfill job, all through `etl-cli` subprocess
//! invocations.
//!
//! Skipped (not failed) when `ETL_DATABASE_URL` isn't set, the same
//! local+CI-friendly convention the teacher's own CLI scenario tests used.

use base64::Engine;
use chrono::{Duration, Utc};
use etl_approval::ApprovalWorkflow;
use uuid::Uuid;

/// 32 zero bytes, base64-encoded — a throwaway key `commands::boot()` needs
/// to construct `EncryptedFieldCodec`, not used for anything this test reads.
const TEST_ENCRYPTION_KEY_B64: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

fn db_url() -> Option<String> {
    std::env::var(etl_db::ENV_DB_URL).ok()
}

#[tokio::test]
async fn approve_materialize_then_backfill_submit_and_cancel() -> anyhow::Result<()> {
    let Some(url) = db_url() else {
        eprintln!("SKIP: {} not set", etl_db::ENV_DB_URL);
        return Ok(());
    };

    let pool = etl_db::connect(&url).await?;
    etl_db::migrate(&pool).await?;

    let source_id = Uuid::new_v4();
    let source_code = format!("SRC_{}", Uuid::new_v4().simple());
    etl_db::insert_source_database(&pool, source_id, &source_code, "POSTGRESQL", "localhost", 5432, "srcdb", "user", None).await?;

    let key = base64::engine::general_purpose::STANDARD.decode(TEST_ENCRYPTION_KEY_B64)?;
    let codec = etl_crypto::EncryptedFieldCodec::new(&key)?;
    let loader_code = format!("LDR_{}", Uuid::new_v4().simple());
    let draft = serde_json::json!({
        "loader_code": loader_code,
        "sql_encrypted": codec.encrypt("select 1")?,
        "source_database_id": source_id,
        "min_interval_seconds": 60,
        "max_interval_seconds": 3600,
        "max_query_period_seconds": 86400,
        "max_parallel_executions": 1,
        "purge_strategy": "PURGE_AND_RELOAD",
        "source_timezone_offset_hours": 0,
        "aggregation_period_seconds": null,
    });
    let workflow = ApprovalWorkflow::new(pool.clone());
    let request_id = workflow.submit("LOADER", Uuid::new_v4(), "test-harness", draft).await?;

    let mut approve_cmd = assert_cmd::Command::cargo_bin("etl-cli")?;
    approve_cmd
        .env(etl_db::ENV_DB_URL, &url)
        .env("ETL_ENCRYPTION_KEY", TEST_ENCRYPTION_KEY_B64)
        .args(["approval", "approve", &request_id.to_string(), "--actor", "test-harness"]);
    approve_cmd.assert().success();

    let mut materialize_cmd = assert_cmd::Command::cargo_bin("etl-cli")?;
    materialize_cmd
        .env(etl_db::ENV_DB_URL, &url)
        .env("ETL_ENCRYPTION_KEY", TEST_ENCRYPTION_KEY_B64)
        .args(["approval", "materialize"]);
    materialize_cmd.assert().success();

    let loader = etl_db::get_active_loader(&pool, &loader_code).await?;
    assert!(loader.is_some(), "loader should be ACTIVE after materialization");

    let now = Utc::now();
    let from_time = (now - Duration::days(2)).to_rfc3339();
    let to_time = (now - Duration::days(1)).to_rfc3339();

    let mut submit_cmd = assert_cmd::Command::cargo_bin("etl-cli")?;
    submit_cmd
        .env(etl_db::ENV_DB_URL, &url)
        .env("ETL_ENCRYPTION_KEY", TEST_ENCRYPTION_KEY_B64)
        .args([
        "backfill",
        "submit",
        "--loader-code",
        &loader_code,
        "--from-time",
        &from_time,
        "--to-time",
        &to_time,
    ]);
    let output = submit_cmd.output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let job_id = stdout
        .lines()
        .find_map(|l| l.strip_prefix("job_id="))
        .expect("submit prints job_id=...")
        .to_string();

    let mut cancel_cmd = assert_cmd::Command::cargo_bin("etl-cli")?;
    cancel_cmd
        .env(etl_db::ENV_DB_URL, &url)
        .env("ETL_ENCRYPTION_KEY", TEST_ENCRYPTION_KEY_B64)
        .args(["backfill", "cancel", &job_id]);
    cancel_cmd.assert().success();

    let job = etl_db::get_backfill_job(&pool, Uuid::parse_str(&job_id)?).await?.expect("job should still exist");
    assert_eq!(job.status, "CANCELLED");

    Ok(())
}

#[tokio::test]
async fn db_status_reports_ok_against_a_live_database() -> anyhow::Result<()> {
    let Some(url) = db_url() else {
        eprintln!("SKIP: {} not set", etl_db::ENV_DB_URL);
        return Ok(());
    };

    let pool = etl_db::connect(&url).await?;
    etl_db::migrate(&pool).await?;

    let mut cmd = assert_cmd::Command::cargo_bin("etl-cli")?;
    cmd.env(etl_db::ENV_DB_URL, &url).args(["db", "status"]);
    cmd.assert().success().stdout(predicates::str::contains("db_ok=true"));

    Ok(())
}
