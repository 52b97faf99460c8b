//! Reading timeline
//!
//! The reconciled, ordered history of glucose readings and everything
//! derived from it.
//!
//! ## Architecture
//!
//! - **Normalizer**: raw timestamps (epoch or ISO-8601) to epoch seconds
//! - **Reconciler**: seed / extend / splice with change notifications
//! - **Query**: range slices, table rows, chart series
//! - **Display**: elapsed time and relative labels for the live reading

mod display;
mod error;
mod normalize;
mod query;
mod reconciler;
mod types;

pub use display::{
    elapsed_since, format_time_of_day, format_timestamp, relative_label, status_line,
    time_since_last, LiveStatus,
};
pub use error::{TimelineError, TimelineResult};
pub use normalize::{normalize_batch, normalize_reading, normalize_timestamp, snap_to_minute};
pub use query::{chart_series, range, summary, table_rows, ChartPoint, TableRow, TimelineSummary};
pub use reconciler::{Reconciler, SpliceOutcome, SplicePolicy, TimelineEvent};
pub use types::{RawReading, RawTimestamp, Reading};
