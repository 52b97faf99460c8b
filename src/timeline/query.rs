//! Timeline projections
//!
//! Read-only views over a descending timeline: time-range slices, table
//! rows, chart series and summary statistics.

use serde::Serialize;

use super::display::{format_time_of_day, format_timestamp};
use super::types::Reading;

/// One row of the readings table
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableRow {
    pub value: f64,
    pub timestamp: i64,
    /// Formatted UTC time
    pub time: String,
}

/// One point of the trend chart
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartPoint {
    pub timestamp: i64,
    pub value: f64,
    /// Axis tick label
    pub tick: String,
}

/// Summary statistics over a timeline
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimelineSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub earliest: i64,
    pub latest: i64,
}

/// Readings with `from <= timestamp <= to`, still newest first
pub fn range(timeline: &[Reading], from: i64, to: i64) -> &[Reading] {
    if from > to {
        return &[];
    }

    // Descending order: everything newer than `to` sits at the front
    let start = timeline.partition_point(|r| r.timestamp > to);
    let end = timeline.partition_point(|r| r.timestamp >= from);
    &timeline[start..end.max(start)]
}

/// Table rows, newest first
pub fn table_rows(timeline: &[Reading]) -> Vec<TableRow> {
    timeline
        .iter()
        .map(|r| TableRow {
            value: r.value,
            timestamp: r.timestamp,
            time: format_timestamp(r.timestamp),
        })
        .collect()
}

/// Chart series, oldest first
pub fn chart_series(timeline: &[Reading]) -> Vec<ChartPoint> {
    timeline
        .iter()
        .rev()
        .map(|r| ChartPoint {
            timestamp: r.timestamp,
            value: r.value,
            tick: format_time_of_day(r.timestamp),
        })
        .collect()
}

/// Summary statistics; `None` for an empty timeline
pub fn summary(timeline: &[Reading]) -> Option<TimelineSummary> {
    let latest = timeline.first()?.timestamp;
    let earliest = timeline.last()?.timestamp;

    let min = timeline.iter().map(|r| r.value).fold(f64::INFINITY, f64::min);
    let max = timeline
        .iter()
        .map(|r| r.value)
        .fold(f64::NEG_INFINITY, f64::max);
    let mean = timeline.iter().map(|r| r.value).sum::<f64>() / timeline.len() as f64;

    Some(TimelineSummary {
        count: timeline.len(),
        min,
        max,
        mean,
        earliest,
        latest,
    })
}
