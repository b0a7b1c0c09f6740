//! Timestamp parsing, canonicalization, and the `TimestampProcessor`
//! transformation step.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::model::{CleanReading, Reading};

/// India Standard Time offset: +05:30, fixed (no DST).
const IST_OFFSET: Duration = Duration::minutes(5 * 60 + 30);

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses `raw` permissively: RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]`, and
/// `MM/DD/YYYY hh:mm AM/PM`. A naive timestamp with no offset is treated as
/// UTC. Returns `None` if no known format matches.
pub fn parse_permissive(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, CANONICAL_FORMAT) {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%m/%d/%Y %I:%M %p") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%m/%d/%Y %I:%M:%S %p") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }
    None
}

/// Canonical string form `YYYY-MM-DDTHH:MM:SS`, truncated to whole seconds.
pub fn canonicalize(dt: DateTime<Utc>) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

/// `timestamp + 5h30m`, in the same canonical string form.
pub fn to_ist_string(dt: DateTime<Utc>) -> String {
    (dt + IST_OFFSET).format(CANONICAL_FORMAT).to_string()
}

/// `TimestampProcessor`: canonicalizes `timestamp` to
/// whole-second precision, derives `timestamp_ist` and `date`, and seeds the
/// feature columns at neutral defaults for `FeatureEngineer` to fill in.
/// Rows arrive already parsed (unparseable input never survives ingestion's
/// permissive read), so no row is dropped here — step 1 of §4.7 is
/// satisfied upstream, at the Parquet read boundary.
pub fn process(rows: Vec<CleanReading>) -> Vec<Reading> {
    rows.into_iter()
        .map(|row| {
            let truncated = Utc.timestamp_opt(row.timestamp.timestamp(), 0).unwrap();
            Reading {
                sensor_id: row.sensor_id,
                reading_type: row.reading_type,
                timestamp: truncated,
                timestamp_ist: to_ist_string(truncated),
                date: truncated.date_naive(),
                value: row.value,
                battery_level: row.battery_level,
                daily_avg: row.value,
                rolling_7d_avg: row.value,
                anomalous_reading: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339() {
        let parsed = parse_permissive("2025-06-05T10:00:00Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 5, 10, 0, 0).unwrap());
    }

    #[test]
    fn parses_space_separated_datetime() {
        let parsed = parse_permissive("2025-06-05 10:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 5, 10, 0, 0).unwrap());
    }

    #[test]
    fn parses_us_style_with_am_pm() {
        let parsed = parse_permissive("06/05/2025 10:00 AM").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 6, 5, 10, 0, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_permissive("not a date").is_none());
        assert!(parse_permissive("").is_none());
    }

    #[test]
    fn ist_offset_is_five_thirty_ahead() {
        let dt = Utc.with_ymd_and_hms(2025, 6, 5, 10, 0, 0).unwrap();
        assert_eq!(to_ist_string(dt), "2025-06-05T15:30:00");
    }

    #[test]
    fn process_seeds_date_and_ist_fields() {
        let rows = vec![CleanReading {
            sensor_id: "s1".to_string(),
            reading_type: "temperature".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 5, 10, 0, 0).unwrap(),
            value: 25.0,
            battery_level: 90.0,
        }];
        let out = process(rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].timestamp_ist, "2025-06-05T15:30:00");
        assert_eq!(
            out[0].date,
            chrono::NaiveDate::from_ymd_opt(2025, 6, 5).unwrap()
        );
    }
}
