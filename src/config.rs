//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::timeline::SplicePolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Readings API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Which endpoints receive the API key
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_true")]
    pub readings: bool,

    #[serde(default)]
    pub poll: bool,

    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            readings: true,
            poll: false,
            stream: true,
        }
    }
}

/// Timeline synchronization configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_granularity")]
    pub granularity: String,

    #[serde(default = "default_window_hours")]
    pub window_hours: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub splice_policy: SplicePolicy,

    #[serde(default = "default_true")]
    pub stream_enabled: bool,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_granularity() -> String {
    "1m".to_string()
}

fn default_window_hours() -> u64 {
    24
}

fn default_poll_interval() -> u64 {
    60
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            granularity: default_granularity(),
            window_hours: default_window_hours(),
            poll_interval_secs: default_poll_interval(),
            splice_policy: SplicePolicy::default(),
            stream_enabled: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("glucose-timeline").join("config.toml")),
            Some(PathBuf::from("/etc/glucose-timeline/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Window start for a live bulk load, relative to `now`
    pub fn window_start(&self, now: i64) -> i64 {
        now - (self.sync.window_hours as i64) * 3600
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // API overrides
        if let Some(url) = var("GLUCOSE_API_URL") {
            self.api.base_url = url;
        }
        if let Some(key) = var("GLUCOSE_API_KEY") {
            self.api.api_key = Some(key);
        }

        // Sync overrides
        if let Some(granularity) = var("GLUCOSE_GRANULARITY") {
            self.sync.granularity = granularity;
        }
        if let Some(interval) = var("GLUCOSE_POLL_INTERVAL_SECS") {
            match interval.parse() {
                Ok(secs) => self.sync.poll_interval_secs = secs,
                Err(_) => tracing::warn!(value = %interval, "Ignoring invalid poll interval"),
            }
        }
        if let Some(policy) = var("GLUCOSE_SPLICE_POLICY") {
            match policy.parse() {
                Ok(policy) => self.sync.splice_policy = policy,
                Err(e) => tracing::warn!("Ignoring GLUCOSE_SPLICE_POLICY: {}", e),
            }
        }

        // Logging overrides
        if let Some(level) = var("GLUCOSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("GLUCOSE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Glucose Timeline Configuration
#
# Environment variables override these settings:
# - GLUCOSE_API_URL
# - GLUCOSE_API_KEY
# - GLUCOSE_GRANULARITY
# - GLUCOSE_POLL_INTERVAL_SECS
# - GLUCOSE_SPLICE_POLICY
# - GLUCOSE_LOG_LEVEL
# - GLUCOSE_LOG_FORMAT

[api]
# Readings API base URL, including the API prefix
base_url = "http://localhost:8000/api"

# API key sent as the X-API-KEY header
# api_key = ""

# Per-request timeout in seconds
request_timeout_secs = 10

# Attempts per fetch before giving up
max_retries = 3

[auth]
# Send the API key on the bulk readings fetch
readings = true

# Send the API key on the incremental poll
poll = false

# Send the API key when opening the stream
stream = true

[sync]
# Bucket size requested from the API
granularity = "1m"

# Hours of history loaded on start
window_hours = 24

# Seconds between incremental polls
poll_interval_secs = 60

# What stream pushes do: "live_only" or "fold_into_timeline"
splice_policy = "live_only"

# Subscribe to the push channel
stream_enabled = true

# Stream reconnect attempts before giving up
max_reconnect_attempts = 5

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
