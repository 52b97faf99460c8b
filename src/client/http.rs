//! Readings API HTTP client
//!
//! Bulk and incremental fetches go through `fetch_readings`, which retries
//! transient failures. The stream endpoint is opened once per call to
//! `subscribe_stream`; reconnecting is the caller's job.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

use super::error::{ClientError, ClientResult};
use super::sse::SseDecoder;
use super::{ClientConfig, FetchKind, ReadingQuery, ReadingSource, ReadingStream};
use crate::timeline::RawReading;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Header carrying the id of the last event seen before a reconnect
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// HTTP client for the glucose readings API
pub struct ReadingsClient {
    client: Client,
    config: ClientConfig,
}

impl ReadingsClient {
    /// Create a new client with the given configuration
    ///
    /// No whole-request timeout is set on the client itself since the
    /// stream response never completes; fetches set one per request.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// URL of the readings endpoint for `query`
    pub fn readings_url(&self, query: &ReadingQuery) -> String {
        format!(
            "{}/glucose-readings?{}",
            self.config.base_url.trim_end_matches('/'),
            query.to_query_string()
        )
    }

    /// URL of the stream endpoint
    pub fn stream_url(&self) -> String {
        format!(
            "{}/glucose-readings/stream",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Fetch readings, retrying timeouts, connect failures and rate limits
    pub async fn fetch_readings(&self, query: &ReadingQuery) -> ClientResult<Vec<RawReading>> {
        let url = self.readings_url(query);
        let with_key = match query.kind {
            FetchKind::Bulk => self.config.auth.readings,
            FetchKind::Poll => self.config.auth.poll,
        };

        let mut last_error = ClientError::Unavailable;
        let mut retry_after: Option<Duration> = None;

        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                // Server-requested delay, else backoff: 1s, 4s, 9s...
                let delay = retry_after
                    .take()
                    .unwrap_or_else(|| Duration::from_secs((attempt as u64).pow(2)));
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying fetch");
                tokio::time::sleep(delay).await;
            }

            let request = self
                .authorize(self.client.get(&url), with_key)
                .timeout(Duration::from_millis(self.config.request_timeout_ms));

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let body = response.text().await.map_err(ClientError::from_transport)?;
                    return decode_readings_body(&body);
                }
                Ok(response) if response.status().as_u16() == 429 => {
                    retry_after = response
                        .headers()
                        .get(header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.trim().parse::<u64>().ok())
                        .map(Duration::from_secs);
                    tracing::warn!(attempt, retry_after = ?retry_after, "Readings fetch rate limited");
                    last_error = ClientError::RateLimited;
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    tracing::error!(status = status.as_u16(), body = %text, "Readings fetch failed");
                    return Err(ClientError::Status {
                        status: status.as_u16(),
                        message: text,
                    });
                }
                Err(e) => {
                    last_error = ClientError::from_transport(e);
                    tracing::warn!(attempt, error = %last_error, "Readings fetch attempt failed");
                    if !last_error.is_retryable() {
                        return Err(last_error);
                    }
                }
            }
        }

        Err(last_error)
    }

    /// Open the stream endpoint and decode its body into events
    ///
    /// `last_event_id` is sent as `Last-Event-ID` so the server can replay
    /// what was missed while disconnected.
    pub async fn subscribe_stream(
        &self,
        last_event_id: Option<&str>,
    ) -> ClientResult<ReadingStream> {
        let mut request = self
            .authorize(self.client.get(self.stream_url()), self.config.auth.stream)
            .header(header::ACCEPT, "text/event-stream");
        if let Some(id) = last_event_id {
            request = request.header(LAST_EVENT_ID_HEADER, id);
        }

        let response = request.send().await.map_err(ClientError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        tracing::info!(url = %self.stream_url(), "Reading stream connected");

        let mut decoder = SseDecoder::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder.feed(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(ClientError::from_transport(e))],
            })
            .flat_map(stream::iter)
            .boxed();

        Ok(events)
    }

    fn authorize(&self, request: RequestBuilder, with_key: bool) -> RequestBuilder {
        match (&self.config.api_key, with_key) {
            (Some(key), true) => request.header(API_KEY_HEADER, key),
            _ => request,
        }
    }
}

#[async_trait]
impl ReadingSource for ReadingsClient {
    async fn fetch(&self, query: &ReadingQuery) -> ClientResult<Vec<RawReading>> {
        self.fetch_readings(query).await
    }

    async fn stream(&self, last_event_id: Option<String>) -> ClientResult<ReadingStream> {
        self.subscribe_stream(last_event_id.as_deref()).await
    }
}

/// Decode a readings response body
///
/// The body must be a JSON array. Elements that do not decode as readings
/// are dropped individually.
pub fn decode_readings_body(body: &str) -> ClientResult<Vec<RawReading>> {
    let items: Vec<Value> = serde_json::from_str(body)?;
    let total = items.len();

    let readings: Vec<RawReading> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawReading>(item) {
            Ok(reading) => Some(reading),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable reading");
                None
            }
        })
        .collect();

    if readings.len() < total {
        tracing::warn!(
            dropped = total - readings.len(),
            total,
            "Some readings could not be decoded"
        );
    }

    Ok(readings)
}
