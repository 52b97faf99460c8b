//! Timestamp normalization
//!
//! Everything entering the timeline is converted to UTC epoch seconds here.
//! Strings without an offset are read as UTC; no local-time correction is
//! ever applied.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::error::{TimelineError, TimelineResult};
use super::types::{RawReading, RawTimestamp, Reading};

/// Naive datetime layouts accepted after RFC 3339 fails
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Convert a raw timestamp into epoch seconds
pub fn normalize_timestamp(raw: &RawTimestamp) -> TimelineResult<i64> {
    match raw {
        RawTimestamp::Epoch(ts) => parse_epoch(*ts),
        RawTimestamp::Iso(s) => parse_iso(s),
    }
}

fn parse_epoch(ts: i64) -> TimelineResult<i64> {
    // Outside chrono's range nothing downstream can format or offset it
    match DateTime::from_timestamp(ts, 0) {
        Some(_) => Ok(ts),
        None => Err(TimelineError::InvalidTimestamp(ts.to_string())),
    }
}

fn parse_iso(s: &str) -> TimelineResult<i64> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt.and_utc().timestamp());
        }
    }

    // Date-only strings mean midnight UTC
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp());
        }
    }

    Err(TimelineError::InvalidTimestamp(s.to_string()))
}

/// Normalize a single raw reading
pub fn normalize_reading(raw: &RawReading) -> TimelineResult<Reading> {
    let timestamp = normalize_timestamp(&raw.timestamp)?;
    Ok(Reading::new(raw.value, timestamp))
}

/// Normalize a batch, dropping records whose timestamp cannot be parsed
///
/// Returns the surviving readings in input order and the number dropped.
/// A bad record never aborts the batch.
pub fn normalize_batch(raw: &[RawReading]) -> (Vec<Reading>, usize) {
    let mut readings = Vec::with_capacity(raw.len());
    let mut dropped = 0;

    for record in raw {
        match normalize_reading(record) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                dropped += 1;
                tracing::warn!(error = %e, value = record.value, "Dropping reading");
            }
        }
    }

    (readings, dropped)
}

/// Snap a timestamp to the nearest minute boundary
///
/// Rounds up only when the remainder exceeds 30 seconds; exactly 30 rounds down.
pub fn snap_to_minute(ts: i64) -> i64 {
    let rem = ts.rem_euclid(60);
    if rem > 30 {
        ts.saturating_sub(rem).saturating_add(60)
    } else {
        ts.saturating_sub(rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_and_epoch_agree() {
        let iso = RawTimestamp::from("2024-01-01T00:00:00Z");
        let epoch = RawTimestamp::from(1704067200);

        assert_eq!(normalize_timestamp(&iso).unwrap(), 1704067200);
        assert_eq!(normalize_timestamp(&epoch).unwrap(), 1704067200);
    }

    #[test]
    fn test_iso_with_offset() {
        let ts = RawTimestamp::from("2024-01-01T10:00:00+10:00");
        assert_eq!(normalize_timestamp(&ts).unwrap(), 1704067200);
    }

    #[test]
    fn test_naive_strings_read_as_utc() {
        let t = RawTimestamp::from("2024-01-01T00:01:00");
        assert_eq!(normalize_timestamp(&t).unwrap(), 1704067260);

        let space = RawTimestamp::from("2024-01-01 00:01:00.750");
        assert_eq!(normalize_timestamp(&space).unwrap(), 1704067260);

        let date = RawTimestamp::from("2024-01-01");
        assert_eq!(normalize_timestamp(&date).unwrap(), 1704067200);
    }

    #[test]
    fn test_fractional_seconds_floor() {
        let ts = RawTimestamp::from("2024-01-01T00:00:59.999Z");
        assert_eq!(normalize_timestamp(&ts).unwrap(), 1704067259);
    }

    #[test]
    fn test_invalid_timestamp() {
        let ts = RawTimestamp::from("not a date");
        assert_eq!(
            normalize_timestamp(&ts),
            Err(TimelineError::InvalidTimestamp("not a date".to_string()))
        );
    }

    #[test]
    fn test_out_of_range_epoch_rejected() {
        assert_eq!(
            normalize_timestamp(&RawTimestamp::Epoch(i64::MIN)),
            Err(TimelineError::InvalidTimestamp(i64::MIN.to_string()))
        );
        assert!(normalize_timestamp(&RawTimestamp::Epoch(i64::MAX)).is_err());
        assert_eq!(normalize_timestamp(&RawTimestamp::Epoch(0)), Ok(0));
        assert_eq!(
            normalize_timestamp(&RawTimestamp::Epoch(-86400)),
            Ok(-86400)
        );
    }

    #[test]
    fn test_batch_drops_bad_records() {
        let raw = vec![
            RawReading::new(5.1, "2024-01-01T00:02:00Z"),
            RawReading::new(9.9, "garbage"),
            RawReading::new(5.3, 1704067260),
        ];

        let (readings, dropped) = normalize_batch(&raw);
        assert_eq!(dropped, 1);
        assert_eq!(
            readings,
            vec![Reading::new(5.1, 1704067320), Reading::new(5.3, 1704067260)]
        );
    }

    #[test]
    fn test_snap_to_minute() {
        assert_eq!(snap_to_minute(1704067200), 1704067200);
        assert_eq!(snap_to_minute(1704067229), 1704067200);
        assert_eq!(snap_to_minute(1704067230), 1704067200);
        assert_eq!(snap_to_minute(1704067231), 1704067260);
        assert_eq!(snap_to_minute(1704067259), 1704067260);
        assert_eq!(snap_to_minute(-29), 0);
        assert_eq!(snap_to_minute(-31), -60);
    }

    #[test]
    fn test_snap_to_minute_saturates_at_extremes() {
        // i64::MIN sits 52s past a boundary and rounds up
        assert_eq!(snap_to_minute(i64::MIN), i64::MIN + 60);
        assert_eq!(snap_to_minute(i64::MAX), i64::MAX - 7);
    }
}
