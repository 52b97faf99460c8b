//! Client error types

use thiserror::Error;

use crate::timeline::TimelineError;

/// Errors that can occur when talking to the readings API
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Readings API unavailable")]
    Unavailable,

    #[error("Rate limited")]
    RateLimited,

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ClientError {
    /// Network-level failure: the request did not produce usable data
    pub fn is_network(&self) -> bool {
        !matches!(self, ClientError::Decode(_))
    }

    /// Whether retrying the same request can help
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout | ClientError::Unavailable | ClientError::RateLimited
        )
    }

    /// Classify a transport error
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_connect() {
            ClientError::Unavailable
        } else {
            ClientError::Request(err)
        }
    }
}

impl From<TimelineError> for ClientError {
    fn from(err: TimelineError) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
