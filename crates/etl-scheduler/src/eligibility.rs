//! Pure eligibility predicate (§4.4 step 3), kept out of the DB-driving tick
//! loop so it's covered by a fast unit test the way `select_window` in
//! `etl-pipeline` stays a standalone function for the same reason.

use chrono::{DateTime, Duration, Utc};
use etl_db::LoaderRow;

/// A `FAILED` loader is treated as `IDLE` once it has been failed for at
/// least this long (§4.3's auto-recovery rule) — a pure read-time
/// reinterpretation, never a background mutation of `load_status`.
pub const AUTO_RECOVERY_THRESHOLD: Duration = Duration::minutes(20);

/// Whether `loader` is a candidate for dispatch this tick. The window check
/// (`select_window` returning `Some`) is applied separately by the caller —
/// this only covers the `loadStatus` half of the predicate.
pub fn is_due(loader: &LoaderRow, now: DateTime<Utc>) -> bool {
    match loader.load_status.as_str() {
        "IDLE" => true,
        "FAILED" => loader
            .failed_since
            .map(|since| now - since >= AUTO_RECOVERY_THRESHOLD)
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn loader(load_status: &str, failed_since: Option<DateTime<Utc>>) -> LoaderRow {
        LoaderRow {
            id: Uuid::new_v4(),
            loader_code: "L1".to_string(),
            sql_encrypted: String::new(),
            source_database_id: Uuid::new_v4(),
            min_interval_seconds: 60,
            max_interval_seconds: 3600,
            max_query_period_seconds: 86400,
            max_parallel_executions: 1,
            purge_strategy: "SKIP_DUPLICATES".to_string(),
            source_timezone_offset_hours: 0,
            aggregation_period_seconds: None,
            last_load_timestamp: None,
            failed_since,
            consecutive_zero_record_runs: 0,
            load_status: load_status.to_string(),
            enabled: true,
            approval_status: "APPROVED".to_string(),
            version_number: 1,
            parent_version_id: None,
            version_status: "ACTIVE".to_string(),
        }
    }

    #[test]
    fn idle_loader_is_always_due() {
        assert!(is_due(&loader("IDLE", None), Utc::now()));
    }

    #[test]
    fn running_loader_is_never_due() {
        assert!(!is_due(&loader("RUNNING", None), Utc::now()));
    }

    #[test]
    fn paused_loader_is_never_due() {
        assert!(!is_due(&loader("PAUSED", None), Utc::now()));
    }

    #[test]
    fn recently_failed_loader_is_not_due() {
        let now = Utc::now();
        let l = loader("FAILED", Some(now - Duration::minutes(5)));
        assert!(!is_due(&l, now));
    }

    #[test]
    fn failed_loader_past_the_recovery_threshold_is_due() {
        let now = Utc::now();
        let l = loader("FAILED", Some(now - Duration::minutes(21)));
        assert!(is_due(&l, now));
    }

    #[test]
    fn failed_loader_exactly_at_the_threshold_is_due() {
        let now = Utc::now();
        let l = loader("FAILED", Some(now - AUTO_RECOVERY_THRESHOLD));
        assert!(is_due(&l, now));
    }

    #[test]
    fn failed_loader_with_no_failed_since_is_not_due() {
        assert!(!is_due(&loader("FAILED", None), Utc::now()));
    }
}
