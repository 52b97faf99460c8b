//! Session producers
//!
//! Each producer runs in its own task and only ever sends events into the
//! session queue; none of them touches the reconciler's state directly.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use super::{SessionConfig, SessionEvent};
use crate::client::{ReadingQuery, ReadingSource};
use crate::timeline::Reconciler;

/// One-shot bulk load for the current window
pub(super) async fn run_bulk_fetch(
    source: Arc<dyn ReadingSource>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    epoch: u64,
    query: ReadingQuery,
) {
    tracing::debug!(from = query.from, to = ?query.to, "Fetching readings");
    let result = source.fetch(&query).await;
    let _ = tx.send(SessionEvent::Seed { epoch, result });
}

/// Incremental poll on a fixed interval, bounded below by the timeline head
pub(super) async fn run_poller(
    source: Arc<dyn ReadingSource>,
    reconciler: Arc<RwLock<Reconciler>>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    epoch: u64,
    config: SessionConfig,
    window_from: i64,
) {
    let period = config.poll_interval;
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let from = reconciler
            .read()
            .await
            .last_reading_time()
            .unwrap_or(window_from);
        let query = ReadingQuery::poll(config.granularity.clone(), from);

        tracing::debug!(from, "Polling for new readings");
        let result = source.fetch(&query).await;

        if tx.send(SessionEvent::Extend { epoch, result }).is_err() {
            break;
        }
    }
}

/// Push channel subscriber with reconnect and exponential backoff
///
/// Reconnects resume from the last event id seen. A `retry:` hint from the
/// server replaces the configured base delay.
pub(super) async fn run_stream(
    source: Arc<dyn ReadingSource>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    epoch: u64,
    config: SessionConfig,
) {
    let mut attempts: u32 = 0;
    let mut last_event_id: Option<String> = None;
    let mut retry_hint: Option<Duration> = None;

    loop {
        match source.stream(last_event_id.clone()).await {
            Ok(mut events) => {
                attempts = 0;

                while let Some(item) = events.next().await {
                    match item {
                        Ok(event) => {
                            if event.id.is_some() {
                                last_event_id = event.id;
                            }
                            if let Some(ms) = event.retry {
                                retry_hint = Some(Duration::from_millis(ms));
                            }
                            let pushed = SessionEvent::Push {
                                epoch,
                                data: event.data,
                            };
                            if tx.send(pushed).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Reading stream interrupted");
                            break;
                        }
                    }
                }

                tracing::info!(last_event_id = ?last_event_id, "Reading stream closed");
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt = attempts, "Reading stream connect failed");
                let failed = SessionEvent::StreamFailed {
                    epoch,
                    error: e.to_string(),
                };
                if tx.send(failed).is_err() {
                    return;
                }
            }
        }

        if attempts >= config.max_reconnect_attempts {
            tracing::error!(attempts, "Giving up on reading stream");
            let _ = tx.send(SessionEvent::StreamFailed {
                epoch,
                error: format!("stream unavailable after {} attempts", attempts),
            });
            return;
        }

        let base = retry_hint.unwrap_or(config.reconnect_base);
        let delay = reconnect_delay(attempts, base, config.reconnect_cap);
        attempts += 1;
        tracing::debug!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting reading stream"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Exponential backoff: base * 2^attempt, capped
pub(super) fn reconnect_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);

        assert_eq!(reconnect_delay(0, base, cap), Duration::from_secs(1));
        assert_eq!(reconnect_delay(1, base, cap), Duration::from_secs(2));
        assert_eq!(reconnect_delay(4, base, cap), Duration::from_secs(16));
        assert_eq!(reconnect_delay(5, base, cap), Duration::from_secs(30));
        assert_eq!(reconnect_delay(40, base, cap), Duration::from_secs(30));
    }
}
