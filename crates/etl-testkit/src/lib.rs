//! Shared test-only plumbing: a deterministic clock for the crates that take
//! one as a constructor argument (`etl-lock::LockManager`,
//! `etl-scheduler::LoaderScheduler`), plus a `testkit_db_pool()` connect+
//! migrate helper mirroring the one every crate's scenario tests otherwise
//! hand-roll from `ETL_DATABASE_URL`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::PgPool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Env var every scenario test across the workspace reads for a live Postgres
/// to run DB-gated tests against.
pub const ENV_TEST_DATABASE_URL: &str = "ETL_DATABASE_URL";

/// Connect to `ETL_DATABASE_URL` and apply migrations, the same shape as
/// `etl_db::connect_from_env` but against the test-only env var every
/// scenario test in this workspace already expects.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let url = std::env::var(ENV_TEST_DATABASE_URL)
        .with_context(|| format!("missing env var {ENV_TEST_DATABASE_URL}"))?;
    let pool = etl_db::connect(&url).await?;
    etl_db::migrate(&pool).await?;
    Ok(pool)
}

/// A externally-advanceable clock for deterministic time control, mirroring
/// `ReconcileFreshnessGuard<C: Fn() -> i64>`'s injectable-clock pattern.
/// Every time-sensitive component in this workspace (`LockManager`,
/// `LoaderScheduler`, `ExecutionPipeline` window selection) takes its clock
/// as `C: Fn() -> DateTime<Utc>` rather than calling `Utc::now()` internally,
/// so a `FakeClock` plugs straight into their constructors.
#[derive(Clone)]
pub struct FakeClock(Arc<AtomicI64>);

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Arc::new(AtomicI64::new(start.timestamp_millis())))
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0.load(Ordering::SeqCst))
            .single()
            .expect("epoch-ms stored by FakeClock is always in range")
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.0.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    /// A cloneable `Fn() -> DateTime<Utc>` suitable for
    /// `LockManager::new`/`LoaderScheduler::new`'s clock parameter.
    pub fn as_fn(&self) -> impl Fn() -> DateTime<Utc> + Send + Sync + Clone + 'static {
        let this = self.clone();
        move || this.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_the_given_instant() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = FakeClock::new(t0);
        assert_eq!(clock.now(), t0);
    }

    #[test]
    fn advance_moves_the_clock_forward_by_exactly_the_given_duration() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = FakeClock::new(t0);
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), t0 + Duration::minutes(90));
    }

    #[test]
    fn clones_and_as_fn_closures_observe_the_same_advances() {
        let clock = FakeClock::starting_now();
        let clone = clock.clone();
        let read = clock.as_fn();
        let t1 = read();

        clone.advance(Duration::seconds(5));

        assert_eq!(read(), t1 + Duration::seconds(5));
    }

    #[test]
    fn set_overrides_rather_than_accumulates() {
        let clock = FakeClock::starting_now();
        let t1 = Utc.with_ymd_and_hms(2030, 6, 15, 12, 0, 0).unwrap();
        clock.set(t1);
        assert_eq!(clock.now(), t1);
    }
}
