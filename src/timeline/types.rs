//! Core data types for the reading timeline
//!
//! - `Reading`: a normalized glucose measurement (epoch seconds)
//! - `RawReading`: a reading as delivered by the API, before normalization
//! - `RawTimestamp`: the two timestamp encodings the API is known to send

use serde::{Deserialize, Serialize};

/// A single glucose measurement
///
/// `timestamp` is always UTC epoch seconds once a reading is in the timeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    /// Glucose concentration (mmol/L)
    pub value: f64,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

impl Reading {
    pub fn new(value: f64, timestamp: i64) -> Self {
        Self { value, timestamp }
    }
}

/// Timestamp as it appears on the wire
///
/// Older server versions send ISO-8601 strings, newer ones epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch(i64),
    Iso(String),
}

impl From<i64> for RawTimestamp {
    fn from(ts: i64) -> Self {
        RawTimestamp::Epoch(ts)
    }
}

impl From<&str> for RawTimestamp {
    fn from(s: &str) -> Self {
        RawTimestamp::Iso(s.to_string())
    }
}

impl From<String> for RawTimestamp {
    fn from(s: String) -> Self {
        RawTimestamp::Iso(s)
    }
}

impl std::fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawTimestamp::Epoch(ts) => write!(f, "{}", ts),
            RawTimestamp::Iso(s) => write!(f, "{}", s),
        }
    }
}

/// A reading before timestamp normalization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawReading {
    pub value: f64,
    pub timestamp: RawTimestamp,
}

impl RawReading {
    /// Create a raw reading from any supported timestamp encoding
    pub fn new(value: f64, timestamp: impl Into<RawTimestamp>) -> Self {
        Self {
            value,
            timestamp: timestamp.into(),
        }
    }
}

impl From<Reading> for RawReading {
    fn from(reading: Reading) -> Self {
        Self {
            value: reading.value,
            timestamp: RawTimestamp::Epoch(reading.timestamp),
        }
    }
}
