//! Derived display values
//!
//! Elapsed time since a reading, the human-relative label shown next to
//! the live value, and UTC timestamp formatting for table rows.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::Reading;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Seconds elapsed between `reading` and `now`, clamped at zero
pub fn elapsed_since(now: i64, reading: &Reading) -> i64 {
    now.saturating_sub(reading.timestamp).max(0)
}

/// Seconds since the newest timeline entry; `None` for an empty timeline
pub fn time_since_last(now: i64, timeline: &[Reading]) -> Option<i64> {
    timeline.first().map(|head| elapsed_since(now, head))
}

/// Human-relative label for an elapsed duration in seconds
pub fn relative_label(elapsed: i64) -> String {
    match elapsed {
        e if e < 10 => "Just now".to_string(),
        e if e < MINUTE => "< 1 minute ago".to_string(),
        e if e < 2 * MINUTE => "1 minute ago".to_string(),
        e if e < HOUR => format!("{} minutes ago", e / MINUTE),
        e if e < DAY => format!("{} hours ago", e / HOUR),
        e if e < 2 * DAY => "1 day ago".to_string(),
        e => format!("{} days ago", e / DAY),
    }
}

/// Full date and time in UTC, e.g. `01/01/2024, 00:02:00`
pub fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%d/%m/%Y, %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Hour and minute in UTC, used for chart axis ticks
pub fn format_time_of_day(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Snapshot of the live reading for a one-second display tick
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LiveStatus {
    pub value: f64,
    pub timestamp: i64,
    pub time: String,
    pub elapsed_secs: i64,
    pub label: String,
}

impl LiveStatus {
    /// Build the status for `reading` as seen at `now`
    pub fn at(now: i64, reading: &Reading) -> Self {
        let elapsed_secs = elapsed_since(now, reading);

        Self {
            value: reading.value,
            timestamp: reading.timestamp,
            time: format_timestamp(reading.timestamp),
            elapsed_secs,
            label: relative_label(elapsed_secs),
        }
    }
}

impl std::fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} mmol/L at {} ({}, {}s)",
            self.value, self.time, self.label, self.elapsed_secs
        )
    }
}

/// Text for one display tick
///
/// Time since the timeline head, then the live reading. A part with
/// nothing behind it is left out; `None` when both are missing.
pub fn status_line(now: i64, timeline: &[Reading], live: Option<&Reading>) -> Option<String> {
    let since = time_since_last(now, timeline)
        .map(|elapsed| format!("Last reading {} ({}s)", relative_label(elapsed), elapsed));
    let live = live.map(|reading| format!("Live: {}", LiveStatus::at(now, reading)));

    match (since, live) {
        (Some(since), Some(live)) => Some(format!("{} | {}", since, live)),
        (since, live) => since.or(live),
    }
}
