//! # Glucose Timeline
//!
//! Client-side reconciliation of glucose readings. Three independent,
//! asynchronously arriving sources (a bulk fetch, a periodic incremental
//! poll and a server-sent-events push channel) are merged into a single
//! timeline that is strictly descending by timestamp and free of duplicates.
//!
//! ## Modules
//!
//! - [`timeline`]: Reconciler, timestamp normalization, projections
//! - [`client`]: Readings API client (HTTP + SSE)
//! - [`session`]: Serialized live session driving the reconciler
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use glucose_timeline::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let client = ReadingsClient::new(ClientConfig::from(&config))?;
//!
//!     let mut session = LiveSession::new(Arc::new(client), SessionConfig::from(&config));
//!     let mut events = session.subscribe().await;
//!
//!     let now = chrono::Utc::now().timestamp();
//!     session.start(ViewWindow::Live { from: config.window_start(now) })?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{:?}: {} readings", event, session.timeline().await.len());
//!     }
//!
//!     session.stop().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod session;
pub mod timeline;

// Re-export top-level types for convenience
pub use timeline::{
    LiveStatus, RawReading, RawTimestamp, Reading, Reconciler, SpliceOutcome, SplicePolicy,
    TimelineError, TimelineEvent, TimelineResult,
};

pub use client::{
    ClientConfig, ClientError, ClientResult, ReadingQuery, ReadingSource, ReadingsClient,
    SseDecoder, SseEvent,
};

pub use session::{LiveSession, SessionConfig, SessionError, ViewWindow};

pub use config::{Config, ConfigError, LoggingConfig};
