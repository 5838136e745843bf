use chrono::{DateTime, Duration, TimeZone, Utc};
use etl_sources::RowMap;
use etl_types::EtlError;
use sqlx::PgPool;

/// One source row resolved into a `SignalHistory` candidate: the segment
/// combination has been turned into a `segmentCode`, and the row's
/// timestamp column has been normalized to UTC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformedRow {
    pub segment_code: i64,
    pub load_timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Row transformation (§4.3): segment columns `segment1..segment10` (any
/// subset may be null) are resolved via C11's `getOrCreate` under a
/// per-loader serial section; `loadTimestamp` is normalized to UTC using
/// `sourceTimezoneOffsetHours` (subtract the offset when source timestamps
/// are local).
pub async fn transform_row(
    pool: &PgPool,
    loader_code: &str,
    row: &RowMap,
    source_timezone_offset_hours: i16,
) -> Result<TransformedRow, EtlError> {
    let raw_ts = extract_timestamp(row)?;
    let load_timestamp = raw_ts - Duration::hours(source_timezone_offset_hours as i64);

    let value = row
        .get("value")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| EtlError::Validation("row is missing a numeric `value` column".to_string()))?;

    let mut segments: [Option<&str>; 10] = [None; 10];
    for (i, slot) in segments.iter_mut().enumerate() {
        let key = format!("segment{}", i + 1);
        *slot = row.get(&key).and_then(|v| v.as_str());
    }

    let segment_code = etl_db::get_or_create_segment_code(pool, loader_code, &segments).await?;

    Ok(TransformedRow {
        segment_code,
        load_timestamp,
        value,
    })
}

fn extract_timestamp(row: &RowMap) -> Result<DateTime<Utc>, EtlError> {
    let value = row
        .get("load_timestamp")
        .ok_or_else(|| EtlError::Validation("row is missing a `load_timestamp` column".to_string()))?;

    if let Some(s) = value.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| EtlError::Validation(format!("unparseable load_timestamp {s:?}: {e}")));
    }
    if let Some(epoch) = value.as_i64() {
        return Utc
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or_else(|| EtlError::Validation(format!("out-of-range load_timestamp epoch {epoch}")));
    }
    Err(EtlError::Validation(
        "load_timestamp column must be an RFC-3339 string or an integer epoch".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_timestamp_is_shifted_back_to_utc_by_the_offset() {
        let mut row = RowMap::new();
        row.insert("load_timestamp".to_string(), serde_json::json!(1_700_000_000));
        row.insert("value".to_string(), serde_json::json!(3.5));

        let ts = extract_timestamp(&row).unwrap();
        let shifted = ts - Duration::hours(5);
        assert_eq!(shifted, ts - Duration::hours(5));
    }

    #[tokio::test]
    async fn missing_value_column_is_rejected() {
        let mut row = RowMap::new();
        row.insert("load_timestamp".to_string(), serde_json::json!(1_700_000_000));

        // transform_row rejects the missing `value` column before it ever
        // reaches the segment-code lookup, so a lazy (never-connected) pool
        // is fine here.
        let pool = PgPool::connect_lazy("postgres://localhost/does-not-matter").unwrap();
        let result = transform_row(&pool, "LDR_TEST", &row, 0).await;
        assert!(matches!(result, Err(EtlError::Validation(_))));
    }

    #[test]
    fn rfc3339_string_timestamp_parses() {
        let mut row = RowMap::new();
        row.insert("load_timestamp".to_string(), serde_json::json!("2026-01-01T00:00:00Z"));
        let ts = extract_timestamp(&row).unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn malformed_timestamp_is_a_validation_error() {
        let mut row = RowMap::new();
        row.insert("load_timestamp".to_string(), serde_json::json!("not-a-date"));
        assert!(matches!(extract_timestamp(&row), Err(EtlError::Validation(_))));
    }
}
