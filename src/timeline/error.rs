//! Timeline error types
//!
//! Every error here is recoverable: the offending record or message is
//! dropped and the timeline keeps its last known good state.

use thiserror::Error;

/// Errors raised while turning raw input into readings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// Timestamp string could not be parsed as an ISO-8601 datetime
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Payload was not valid JSON or did not have the shape of a reading
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for TimelineError {
    fn from(err: serde_json::Error) -> Self {
        TimelineError::Decode(err.to_string())
    }
}

/// Result type alias for timeline operations
pub type TimelineResult<T> = Result<T, TimelineError>;
