use crate::window::TimeWindow;
use chrono::{DateTime, Duration, Utc};

/// Substitutes `:fromTime`/`:toTime` (UTC) and `:fromTimeTz`/`:toTimeTz`
/// (shifted by `sourceTimezoneOffsetHours`) with quoted ISO-8601 literals.
/// No user-supplied parameter is interpolated — the timezone offset is a
/// server-owned integer column, never caller input.
pub fn substitute_placeholders(sql: &str, window: TimeWindow, source_timezone_offset_hours: i16) -> String {
    let offset = Duration::hours(source_timezone_offset_hours as i64);
    let tz_from = window.from_time + offset;
    let tz_to = window.to_time + offset;

    // Longer placeholder names are substituted first so `:fromTime` doesn't
    // also match the prefix of `:fromTimeTz`.
    sql.replace(":fromTimeTz", &quote(tz_from))
        .replace(":toTimeTz", &quote(tz_to))
        .replace(":fromTime", &quote(window.from_time))
        .replace(":toTime", &quote(window.to_time))
}

fn quote(ts: DateTime<Utc>) -> String {
    format!("'{}'", ts.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> TimeWindow {
        TimeWindow {
            from_time: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc),
            to_time: DateTime::parse_from_rfc3339("2026-01-01T01:00:00Z").unwrap().with_timezone(&Utc),
        }
    }

    #[test]
    fn substitutes_utc_placeholders() {
        let sql = substitute_placeholders("SELECT * FROM t WHERE ts BETWEEN :fromTime AND :toTime", window(), 0);
        assert!(sql.contains("'2026-01-01T00:00:00+00:00'"));
        assert!(sql.contains("'2026-01-01T01:00:00+00:00'"));
    }

    #[test]
    fn tz_placeholders_are_shifted_and_distinct_from_utc_ones() {
        let sql = substitute_placeholders(
            "SELECT * FROM t WHERE ts BETWEEN :fromTimeTz AND :toTimeTz AND :fromTime < now()",
            window(),
            5,
        );
        assert!(sql.contains("'2026-01-01T05:00:00+00:00'"));
        assert!(sql.contains("'2026-01-01T06:00:00+00:00'"));
        assert!(sql.contains("'2026-01-01T00:00:00+00:00'"), "plain :fromTime must stay unshifted");
    }

    #[test]
    fn no_placeholders_present_is_a_no_op() {
        let sql = substitute_placeholders("SELECT 1", window(), 0);
        assert_eq!(sql, "SELECT 1");
    }
}
