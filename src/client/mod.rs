//! Readings API Client
//!
//! The HTTP and server-sent-events side of the dashboard: bulk and
//! incremental fetches of `/glucose-readings` and the push channel at
//! `/glucose-readings/stream`.
//!
//! ## Architecture
//!
//! - **ReadingsClient**: `reqwest` client with per-endpoint API key flags
//! - **SseDecoder**: incremental `text/event-stream` decoder
//! - **Payload**: tolerant decoding of single/double-encoded stream messages
//! - **ReadingSource**: the seam the live session consumes

mod error;
mod http;
mod payload;
mod sse;

pub use error::{ClientError, ClientResult};
pub use http::{decode_readings_body, ReadingsClient, API_KEY_HEADER, LAST_EVENT_ID_HEADER};
pub use payload::decode_stream_payload;
pub use sse::{SseDecoder, SseEvent};

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::timeline::RawReading;

/// Stream of decoded server-sent events
pub type ReadingStream = BoxStream<'static, ClientResult<SseEvent>>;

/// Anything that can deliver readings: the HTTP API, or a fake in tests
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Fetch a batch of readings
    async fn fetch(&self, query: &ReadingQuery) -> ClientResult<Vec<RawReading>>;

    /// Open the push channel, resuming after `last_event_id` when given
    async fn stream(&self, last_event_id: Option<String>) -> ClientResult<ReadingStream>;
}

/// Which fetch a query belongs to; each has its own auth flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Initial or filter-change bulk load
    Bulk,
    /// Periodic incremental poll
    Poll,
}

/// Query parameters for `/glucose-readings`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingQuery {
    pub kind: FetchKind,
    /// Bucket size, e.g. `1m`
    pub granularity: String,
    /// Lower bound (epoch seconds)
    pub from: i64,
    /// Upper bound (epoch seconds); open-ended when absent
    pub to: Option<i64>,
}

impl ReadingQuery {
    pub fn bulk(granularity: impl Into<String>, from: i64, to: Option<i64>) -> Self {
        Self {
            kind: FetchKind::Bulk,
            granularity: granularity.into(),
            from,
            to,
        }
    }

    pub fn poll(granularity: impl Into<String>, from: i64) -> Self {
        Self {
            kind: FetchKind::Poll,
            granularity: granularity.into(),
            from,
            to: None,
        }
    }

    /// Encode as a URL query string, newest first
    pub fn to_query_string(&self) -> String {
        let mut query = format!(
            "order=desc&granularity={}&from={}",
            urlencoding::encode(&self.granularity),
            self.from
        );
        if let Some(to) = self.to {
            query.push_str(&format!("&to={}", to));
        }
        query
    }
}

/// Per-endpoint API key flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthFlags {
    /// Send the key on bulk fetches
    pub readings: bool,
    /// Send the key on incremental polls
    pub poll: bool,
    /// Send the key when opening the stream
    pub stream: bool,
}

impl Default for AuthFlags {
    fn default() -> Self {
        Self {
            readings: true,
            poll: false,
            stream: true,
        }
    }
}

/// Configuration for the readings client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL including the API prefix (e.g., "http://localhost:8000/api")
    pub base_url: String,
    /// Value for the `X-API-KEY` header
    pub api_key: Option<String>,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum attempts per fetch
    pub max_retries: u32,
    pub auth: AuthFlags,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            api_key: None,
            request_timeout_ms: 10_000,
            max_retries: 3,
            auth: AuthFlags::default(),
        }
    }
}

impl From<&crate::config::Config> for ClientConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            base_url: config.api.base_url.clone(),
            api_key: config.api.api_key.clone().filter(|k| !k.is_empty()),
            request_timeout_ms: config.api.request_timeout_secs * 1000,
            max_retries: config.api.max_retries,
            auth: AuthFlags {
                readings: config.auth.readings,
                poll: config.auth.poll,
                stream: config.auth.stream,
            },
        }
    }
}
