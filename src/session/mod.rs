//! Live Session
//!
//! Serializes the three reading producers through one mutation queue.
//!
//! ## Architecture
//!
//! - **Bulk fetch**: once per start or filter change
//! - **Poller**: incremental fetch every `poll_interval`
//! - **Stream**: push channel, reconnecting with backoff
//! - **Applier**: the single task that drains the queue and mutates the
//!   reconciler, one event at a time
//!
//! Every event carries the epoch it was produced under. Stopping or
//! refiltering bumps the epoch, so results that resolve after teardown are
//! discarded instead of mutating a stale timeline.

mod producers;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::{decode_stream_payload, ClientResult, ReadingQuery, ReadingSource};
use crate::config::Config;
use crate::timeline::{RawReading, Reading, Reconciler, SplicePolicy, TimelineEvent};

/// Time window the view is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewWindow {
    /// Open-ended window that keeps growing via poll and stream
    Live { from: i64 },
    /// Fixed window; bulk load only
    Historical { from: i64, to: i64 },
}

impl ViewWindow {
    pub fn lower_bound(&self) -> i64 {
        match self {
            ViewWindow::Live { from } | ViewWindow::Historical { from, .. } => *from,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ViewWindow::Live { .. })
    }

    fn bulk_query(&self, granularity: &str) -> ReadingQuery {
        match *self {
            ViewWindow::Live { from } => ReadingQuery::bulk(granularity, from, None),
            ViewWindow::Historical { from, to } => ReadingQuery::bulk(granularity, from, Some(to)),
        }
    }
}

/// Configuration for a live session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub granularity: String,
    pub poll_interval: Duration,
    pub splice_policy: SplicePolicy,
    pub stream_enabled: bool,
    pub max_reconnect_attempts: u32,
    /// First reconnect delay; doubles per attempt
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            granularity: "1m".to_string(),
            poll_interval: Duration::from_secs(60),
            splice_policy: SplicePolicy::LiveOnly,
            stream_enabled: true,
            max_reconnect_attempts: 5,
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            granularity: config.sync.granularity.clone(),
            poll_interval: Duration::from_secs(config.sync.poll_interval_secs.max(1)),
            splice_policy: config.sync.splice_policy,
            stream_enabled: config.sync.stream_enabled,
            max_reconnect_attempts: config.sync.max_reconnect_attempts,
            ..Self::default()
        }
    }
}

/// Events flowing from producers to the applier
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Seed {
        epoch: u64,
        result: ClientResult<Vec<RawReading>>,
    },
    Extend {
        epoch: u64,
        result: ClientResult<Vec<RawReading>>,
    },
    Push {
        epoch: u64,
        data: String,
    },
    StreamFailed {
        epoch: u64,
        error: String,
    },
}

impl SessionEvent {
    fn epoch(&self) -> u64 {
        match self {
            SessionEvent::Seed { epoch, .. }
            | SessionEvent::Extend { epoch, .. }
            | SessionEvent::Push { epoch, .. }
            | SessionEvent::StreamFailed { epoch, .. } => *epoch,
        }
    }
}

/// Errors from session lifecycle calls
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session was never started")]
    NotStarted,
}

/// A live view over the readings API
pub struct LiveSession {
    id: String,
    source: Arc<dyn ReadingSource>,
    reconciler: Arc<RwLock<Reconciler>>,
    config: SessionConfig,
    epoch: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    applier: JoinHandle<()>,
    producers: Vec<JoinHandle<()>>,
    window: Option<ViewWindow>,
}

impl LiveSession {
    /// Create a session and its applier task; nothing is fetched until `start`
    pub fn new(source: Arc<dyn ReadingSource>, config: SessionConfig) -> Self {
        let id = Uuid::new_v4().to_string();
        let reconciler = Arc::new(RwLock::new(Reconciler::new(config.splice_policy)));
        let epoch = Arc::new(AtomicU64::new(0));
        let (tx, rx) = mpsc::unbounded_channel();

        let applier = tokio::spawn(apply_events(
            id.clone(),
            rx,
            Arc::clone(&reconciler),
            Arc::clone(&epoch),
        ));

        Self {
            id,
            source,
            reconciler,
            config,
            epoch,
            tx,
            applier,
            producers: Vec::new(),
            window: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn window(&self) -> Option<ViewWindow> {
        self.window
    }

    pub fn is_running(&self) -> bool {
        !self.producers.is_empty()
    }

    /// Shared handle to the reconciler for read-only projection
    pub fn reconciler(&self) -> Arc<RwLock<Reconciler>> {
        Arc::clone(&self.reconciler)
    }

    /// Subscribe to timeline change notifications
    pub async fn subscribe(&self) -> broadcast::Receiver<TimelineEvent> {
        self.reconciler.read().await.subscribe()
    }

    /// Snapshot of the timeline, newest first
    pub async fn timeline(&self) -> Vec<Reading> {
        self.reconciler.read().await.timeline().to_vec()
    }

    pub async fn most_recent(&self) -> Option<Reading> {
        self.reconciler.read().await.most_recent()
    }

    /// Start producers for `window`
    pub fn start(&mut self, window: ViewWindow) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.window = Some(window);

        tracing::info!(
            session = %self.id,
            epoch,
            from = window.lower_bound(),
            live = window.is_live(),
            "Starting session"
        );

        self.producers.push(tokio::spawn(producers::run_bulk_fetch(
            Arc::clone(&self.source),
            self.tx.clone(),
            epoch,
            window.bulk_query(&self.config.granularity),
        )));

        if window.is_live() {
            self.producers.push(tokio::spawn(producers::run_poller(
                Arc::clone(&self.source),
                Arc::clone(&self.reconciler),
                self.tx.clone(),
                epoch,
                self.config.clone(),
                window.lower_bound(),
            )));

            if self.config.stream_enabled {
                self.producers.push(tokio::spawn(producers::run_stream(
                    Arc::clone(&self.source),
                    self.tx.clone(),
                    epoch,
                    self.config.clone(),
                )));
            }
        }

        Ok(())
    }

    /// Tear down producers; anything still in flight is discarded
    pub async fn stop(&mut self) {
        {
            // Hold the write lock so no event is mid-apply while the epoch moves
            let _guard = self.reconciler.write().await;
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }

        for handle in self.producers.drain(..) {
            handle.abort();
        }

        tracing::info!(session = %self.id, "Session stopped");
    }

    /// Stop and start again over the same window
    pub async fn restart(&mut self) -> Result<(), SessionError> {
        let window = self.window.ok_or(SessionError::NotStarted)?;
        self.stop().await;
        self.start(window)
    }

    /// Switch to a new window: discard in-flight results and reload
    ///
    /// Leaving live mode also drops the live reading, which would otherwise
    /// go stale next to a historical timeline.
    pub async fn refilter(&mut self, window: ViewWindow) -> Result<(), SessionError> {
        self.stop().await;
        if !window.is_live() {
            self.reconciler.write().await.clear_live();
        }
        self.start(window)
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        for handle in self.producers.drain(..) {
            handle.abort();
        }
        self.applier.abort();
    }
}

/// Drain the queue, applying each current-epoch event to completion
async fn apply_events(
    session: String,
    mut rx: mpsc::UnboundedReceiver<SessionEvent>,
    reconciler: Arc<RwLock<Reconciler>>,
    epoch: Arc<AtomicU64>,
) {
    while let Some(event) = rx.recv().await {
        let mut guard = reconciler.write().await;

        let current = epoch.load(Ordering::SeqCst);
        if event.epoch() != current {
            tracing::debug!(
                session = %session,
                event_epoch = event.epoch(),
                current,
                "Discarding result from a torn-down session"
            );
            continue;
        }

        apply_event(&mut guard, event);
    }
}

fn apply_event(reconciler: &mut Reconciler, event: SessionEvent) {
    match event {
        SessionEvent::Seed { result, .. } => match result {
            Ok(raw) => {
                let count = reconciler.seed(&raw).len();
                tracing::info!(count, "Readings loaded");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch readings");
                reconciler.notice(format!("Error fetching readings: {}", e));
            }
        },
        SessionEvent::Extend { result, .. } => match result {
            Ok(raw) => {
                let added = reconciler.extend(&raw);
                tracing::debug!(added, "Poll applied");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch new readings");
                reconciler.notice(format!("Error fetching new readings: {}", e));
            }
        },
        SessionEvent::Push { data, .. } => {
            let result = decode_stream_payload(&data).and_then(|raw| reconciler.splice(&raw));
            match result {
                Ok(outcome) => tracing::debug!(?outcome, "Stream reading applied"),
                Err(e) => {
                    tracing::warn!(error = %e, payload = %data, "Discarding stream payload");
                    reconciler.notice(format!("Discarded stream reading: {}", e));
                }
            }
        }
        SessionEvent::StreamFailed { error, .. } => {
            reconciler.notice(format!("Stream connection error: {}", error));
        }
    }
}
