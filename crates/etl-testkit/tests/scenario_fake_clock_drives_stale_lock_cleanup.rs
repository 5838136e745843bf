//! Cross-crate scenario: a `FakeClock` advanced past the staleness bound
//! drives `LockManager::cleanup_stale` to release a lock and cancel its
//! handle, without sleeping past a real threshold. Also exercises
//! `release` idempotency against a lock built with `AcquiredLock::for_test`
//! (no `try_acquire` ever ran for it).
//!
//! Skipped (not failed) when `ETL_DATABASE_URL` isn't set.

use chrono::Duration;
use etl_lock::{AcquiredLock, LockManager};
use etl_testkit::FakeClock;
use uuid::Uuid;

#[tokio::test]
async fn advancing_the_fake_clock_past_the_stale_bound_releases_the_lock() -> anyhow::Result<()> {
    let Ok(_) = std::env::var(etl_testkit::ENV_TEST_DATABASE_URL) else {
        eprintln!("SKIP: {} not set", etl_testkit::ENV_TEST_DATABASE_URL);
        return Ok(());
    };
    let pool = etl_testkit::testkit_db_pool().await?;

    let clock = FakeClock::starting_now();
    let manager = LockManager::new(
        pool.clone(),
        clock.as_fn(),
        etl_lock::GLOBAL_LIMIT,
        std::time::Duration::from_secs(60),
        etl_lock::DEFAULT_RELEASED_RETENTION,
    );

    let loader_code = format!("LDR_{}", Uuid::new_v4().simple());
    let acquired = manager
        .try_acquire(&loader_code, "replica-a", 1)
        .await?
        .expect("acquisition under the cap must succeed");
    assert!(!acquired.cancel_handle.is_cancelled());

    clock.advance(Duration::seconds(120));

    let affected = manager.cleanup_stale().await?;
    assert!(affected >= 1, "the lock must be marked released once the clock crosses the stale bound");
    assert!(
        acquired.cancel_handle.is_cancelled(),
        "cleanup_stale must cancel the handle for a lock it owns past the staleness bound"
    );

    Ok(())
}

#[tokio::test]
async fn releasing_a_lock_that_was_never_acquired_is_a_no_op() -> anyhow::Result<()> {
    let Ok(_) = std::env::var(etl_testkit::ENV_TEST_DATABASE_URL) else {
        eprintln!("SKIP: {} not set", etl_testkit::ENV_TEST_DATABASE_URL);
        return Ok(());
    };
    let pool = etl_testkit::testkit_db_pool().await?;

    let clock = FakeClock::starting_now();
    let manager = LockManager::new(
        pool,
        clock.as_fn(),
        etl_lock::GLOBAL_LIMIT,
        std::time::Duration::from_secs(60),
        etl_lock::DEFAULT_RELEASED_RETENTION,
    );

    let phantom = AcquiredLock::for_test("LDR_PHANTOM", "replica-a", clock.now());
    manager.release(phantom.id).await?;

    Ok(())
}
