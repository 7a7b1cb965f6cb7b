//! Hermod error types

use std::time::Duration;

/// Hermod error types
#[derive(Debug, thiserror::Error)]
pub enum HermodError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("429 rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed: invalid api key")]
    AuthenticationFailed,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for HermodError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest hides the io kind behind its own Display; keep the markers
        // the classifier looks for.
        if err.is_timeout() {
            HermodError::Http(format!("timeout: {err}"))
        } else if err.is_connect() {
            HermodError::Http(format!("connection failed: {err}"))
        } else {
            HermodError::Http(err.to_string())
        }
    }
}

/// Result type alias for Hermod operations
pub type Result<T> = std::result::Result<T, HermodError>;
