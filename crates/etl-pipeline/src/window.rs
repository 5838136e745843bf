use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from_time: DateTime<Utc>,
    pub to_time: DateTime<Utc>,
}

/// Window selection for scheduled runs, called from C5. Returns `None` when
/// the loader isn't due yet — "not due" is an ordinary scheduling outcome,
/// not a failure, so it isn't folded into `EtlError`.
pub fn select_window(
    last_load_timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    min_interval_seconds: i32,
    max_query_period_seconds: i32,
) -> Option<TimeWindow> {
    let from_time =
        last_load_timestamp.unwrap_or_else(|| now - Duration::seconds(min_interval_seconds as i64));

    let bound = from_time + Duration::seconds(max_query_period_seconds as i64);
    let to_time = now.min(bound);

    if to_time - from_time < Duration::seconds(min_interval_seconds as i64) {
        return None;
    }

    Some(TimeWindow { from_time, to_time })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_starts_min_interval_before_now() {
        let now = Utc::now();
        let window = select_window(None, now, 60, 3600).unwrap();
        assert_eq!(window.from_time, now - Duration::seconds(60));
        assert_eq!(window.to_time, now);
    }

    #[test]
    fn subsequent_run_starts_at_last_load_timestamp() {
        let now = Utc::now();
        let last = now - Duration::seconds(600);
        let window = select_window(Some(last), now, 60, 3600).unwrap();
        assert_eq!(window.from_time, last);
        assert_eq!(window.to_time, now);
    }

    #[test]
    fn window_is_capped_at_max_query_period_even_when_now_is_further_out() {
        let now = Utc::now();
        let last = now - Duration::seconds(10_000);
        let window = select_window(Some(last), now, 60, 3600).unwrap();
        assert_eq!(window.to_time, last + Duration::seconds(3600));
        assert!(window.to_time < now);
    }

    #[test]
    fn refuses_to_dispatch_when_not_yet_due() {
        let now = Utc::now();
        let last = now - Duration::seconds(10);
        assert!(select_window(Some(last), now, 60, 3600).is_none());
    }
}
