//! C9 GapScanner: periodically diffs queried vs. actually-loaded ranges per
//! loader and submits backfill jobs to close what it finds, the way
//! `mqk-testkit::orchestrator::run` composes a fixed pipeline of steps over
//! each unit of work — here the unit is a loader's recent `LoadHistory`
//! rather than a bar.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use etl_db::LoadHistoryRow;
use etl_types::{EtlError, GapKind};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::service::BackfillService;

pub const DEFAULT_MIN_GAP: ChronoDuration = ChronoDuration::minutes(5);
pub const DEFAULT_LOOKBACK: ChronoDuration = ChronoDuration::days(7);
pub const DEFAULT_SCAN_INTERVAL: StdDuration = StdDuration::from_secs(6 * 60 * 60);
pub const MAX_ACTIVE_JOBS_PER_LOADER: i64 = 5;
const HISTORY_FETCH_LIMIT: i64 = 2000;

struct DetectedGap {
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
    kind: GapKind,
}

pub struct GapScanner<C, CB>
where
    C: Fn() -> DateTime<Utc> + Send + Sync,
    CB: Fn() -> DateTime<Utc> + Send + Sync,
{
    pool: PgPool,
    backfill: Arc<BackfillService<CB>>,
    clock: C,
    min_gap: ChronoDuration,
    lookback: ChronoDuration,
    max_active_jobs: i64,
}

pub type SystemGapScanner = GapScanner<fn() -> DateTime<Utc>, fn() -> DateTime<Utc>>;

impl SystemGapScanner {
    pub fn new_system(pool: PgPool, backfill: Arc<crate::service::SystemBackfillService>) -> Self {
        GapScanner::new(pool, backfill, Utc::now, DEFAULT_MIN_GAP, DEFAULT_LOOKBACK, MAX_ACTIVE_JOBS_PER_LOADER)
    }
}

impl<C, CB> GapScanner<C, CB>
where
    C: Fn() -> DateTime<Utc> + Send + Sync,
    CB: Fn() -> DateTime<Utc> + Send + Sync,
{
    pub fn new(
        pool: PgPool,
        backfill: Arc<BackfillService<CB>>,
        clock: C,
        min_gap: ChronoDuration,
        lookback: ChronoDuration,
        max_active_jobs: i64,
    ) -> Self {
        Self {
            pool,
            backfill,
            clock,
            min_gap,
            lookback,
            max_active_jobs,
        }
    }

    /// Scans every enabled loader, returning the total count of backfill
    /// jobs submitted across all of them.
    pub async fn scan_for_gaps(&self) -> Result<usize, EtlError> {
        let loaders = etl_db::list_enabled_loaders(&self.pool).await?;
        let mut submitted = 0usize;
        for loader in loaders {
            submitted += self.scan_loader(&loader.loader_code).await?;
        }
        Ok(submitted)
    }

    async fn scan_loader(&self, loader_code: &str) -> Result<usize, EtlError> {
        let gaps = self.find_gaps(loader_code).await?;
        if gaps.is_empty() {
            return Ok(0);
        }

        let active = etl_db::count_active_backfill_jobs(&self.pool, loader_code).await?;
        if active > self.max_active_jobs {
            tracing::info!(loader_code, active, "gap-scan/skip-too-many-active-jobs");
            return Ok(0);
        }

        let mut submitted = 0usize;
        for gap in gaps {
            let requested_by = gap.kind.requested_by_tag();
            self.backfill
                .submit_with_gap_kind(
                    loader_code,
                    gap.from_time,
                    gap.to_time,
                    Some("PURGE_AND_RELOAD"),
                    &requested_by,
                    Some(gap.kind.as_str()),
                )
                .await?;
            tracing::info!(loader_code, kind = gap.kind.as_str(), "gap-scan/submitted-backfill");
            submitted += 1;
        }
        Ok(submitted)
    }

    /// Scans `LoadHistory` rows within `lookback` of now, in time order. A
    /// zero-record `SUCCESS` row has no `actual_from`/`actual_to` (C4 never
    /// sets them when nothing was transformed) so it is skipped entirely —
    /// it neither triggers a gap nor breaks the timeline chain; the run
    /// before it is still the nearest point of comparison.
    async fn find_gaps(&self, loader_code: &str) -> Result<Vec<DetectedGap>, EtlError> {
        let history = etl_db::latest_load_history(&self.pool, loader_code, HISTORY_FETCH_LIMIT).await?;
        let cutoff = (self.clock)() - self.lookback;

        let mut rows: Vec<LoadHistoryRow> = history.into_iter().filter(|h| h.window_start >= cutoff).collect();
        rows.sort_by_key(|h| h.window_start);

        let mut gaps = Vec::new();
        let mut previous: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

        for row in &rows {
            if row.status != "SUCCESS" || row.record_count == 0 {
                continue;
            }
            let (Some(actual_from), Some(actual_to)) = (row.actual_from, row.actual_to) else {
                continue;
            };

            if actual_from - row.window_start >= self.min_gap {
                gaps.push(DetectedGap {
                    from_time: row.window_start,
                    to_time: actual_from,
                    kind: GapKind::StartGap,
                });
            }
            if row.window_end - actual_to >= self.min_gap {
                gaps.push(DetectedGap {
                    from_time: actual_to,
                    to_time: row.window_end,
                    kind: GapKind::EndGap,
                });
            }
            if let Some((_, prev_to)) = previous {
                if actual_from - prev_to >= self.min_gap {
                    gaps.push(DetectedGap {
                        from_time: prev_to,
                        to_time: actual_from,
                        kind: GapKind::TimelineGap,
                    });
                }
            }

            previous = Some((actual_from, actual_to));
        }

        Ok(gaps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_row(status: &str, window_start: DateTime<Utc>, window_end: DateTime<Utc>, record_count: i32, actual_from: Option<DateTime<Utc>>, actual_to: Option<DateTime<Utc>>) -> LoadHistoryRow {
        LoadHistoryRow {
            id: uuid::Uuid::new_v4(),
            loader_code: "L1".to_string(),
            window_start,
            window_end,
            status: status.to_string(),
            record_count,
            actual_from,
            actual_to,
            error_message: None,
            requested_by: None,
            started_at: window_start,
            finished_at: Some(window_end),
        }
    }

    /// Pure re-implementation of the chain logic in `find_gaps`, exercised
    /// without a database so the START/END/TIMELINE arithmetic itself is
    /// covered by a fast unit test alongside the DB-gated scenario tests.
    fn gaps_from(rows: &[LoadHistoryRow], min_gap: ChronoDuration) -> Vec<(DateTime<Utc>, DateTime<Utc>, GapKind)> {
        let mut gaps = Vec::new();
        let mut previous: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        for row in rows {
            if row.status != "SUCCESS" || row.record_count == 0 {
                continue;
            }
            let (Some(actual_from), Some(actual_to)) = (row.actual_from, row.actual_to) else {
                continue;
            };
            if actual_from - row.window_start >= min_gap {
                gaps.push((row.window_start, actual_from, GapKind::StartGap));
            }
            if row.window_end - actual_to >= min_gap {
                gaps.push((actual_to, row.window_end, GapKind::EndGap));
            }
            if let Some((_, prev_to)) = previous {
                if actual_from - prev_to >= min_gap {
                    gaps.push((prev_to, actual_from, GapKind::TimelineGap));
                }
            }
            previous = Some((actual_from, actual_to));
        }
        gaps
    }

    #[test]
    fn timeline_gap_detected_between_two_success_rows() {
        let t = Utc::now();
        let a = history_row("SUCCESS", t, t + ChronoDuration::minutes(60), 10, Some(t), Some(t + ChronoDuration::minutes(60)));
        let b_start = t + ChronoDuration::minutes(70);
        let b = history_row(
            "SUCCESS",
            b_start,
            b_start + ChronoDuration::minutes(60),
            10,
            Some(b_start),
            Some(b_start + ChronoDuration::minutes(60)),
        );
        let gaps = gaps_from(&[a, b], DEFAULT_MIN_GAP);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].2, GapKind::TimelineGap);
    }

    #[test]
    fn zero_record_success_row_is_not_a_gap_and_does_not_break_the_chain() {
        let t = Utc::now();
        let a = history_row("SUCCESS", t, t + ChronoDuration::minutes(60), 10, Some(t), Some(t + ChronoDuration::minutes(60)));
        let zero_start = t + ChronoDuration::minutes(60);
        let zero = history_row("SUCCESS", zero_start, zero_start + ChronoDuration::minutes(60), 0, None, None);
        let c_start = zero_start + ChronoDuration::minutes(60);
        let c = history_row(
            "SUCCESS",
            c_start,
            c_start + ChronoDuration::minutes(60),
            10,
            Some(c_start),
            Some(c_start + ChronoDuration::minutes(60)),
        );
        let gaps = gaps_from(&[a, zero, c], DEFAULT_MIN_GAP);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].2, GapKind::TimelineGap);
    }

    #[test]
    fn small_gap_below_threshold_is_not_reported() {
        let t = Utc::now();
        let a = history_row("SUCCESS", t, t + ChronoDuration::minutes(60), 10, Some(t + ChronoDuration::seconds(30)), Some(t + ChronoDuration::minutes(60)));
        let gaps = gaps_from(&[a], DEFAULT_MIN_GAP);
        assert!(gaps.is_empty());
    }
}
