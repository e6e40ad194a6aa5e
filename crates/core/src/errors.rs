//! Error types

use thiserror::Error;

/// Live feed errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Live feed connection failed: {0}")]
    ConnectionFailed(String),
}

/// Errors decoding one live frame or one entry of it
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unexpected frame format: expected an object, got {0}")]
    NotAnObject(&'static str),

    #[error("Invalid price data for {id}: {value}")]
    InvalidEntry { id: String, value: String },

    #[error("Invalid price value for {id}: {value:?}")]
    InvalidPrice { id: String, value: String },
}

impl DecodeError {
    /// Asset id of an entry-level error
    pub fn asset_id(&self) -> Option<&str> {
        match self {
            DecodeError::InvalidEntry { id, .. } | DecodeError::InvalidPrice { id, .. } => {
                Some(id)
            }
            _ => None,
        }
    }
}

/// REST upstream errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0} API key is missing")]
    MissingApiKey(&'static str),

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl UpstreamError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::RateLimited(_))
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias
pub type FeedResult<T> = Result<T, FeedError>;
pub type DecodeResult<T> = Result<T, DecodeError>;
pub type UpstreamResult<T> = Result<T, UpstreamError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
