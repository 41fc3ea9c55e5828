// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    /// URL could not be split into host and path components
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Shared connection is absent, closed or lost. Never retried internally.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A dequeued item or delivered event could not be decoded.
    /// The offending item has already been consumed.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// True when the error means the connection can no longer be used
    pub fn is_connectivity(&self) -> bool {
        matches!(self, AppError::Connectivity(_))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: redis::RedisError conversion is handled in infra-redis crate
// by converting to AppError::Connectivity(String)
