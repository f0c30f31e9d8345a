//! Error types for the purge engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authorization rejected for {scope} (HTTP {status})")]
    AuthError { scope: String, status: u16 },

    /// Transient throttling. The engine and resolver wait these out internally,
    /// so this only reaches callers that drive a [`crate::DiscordApi`] directly
    /// and want to surface an `HttpOutcome::RateLimited` as an error.
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Search index for {scope} still lists {total} result(s) after {pages} pages of processed messages")]
    StaleIndex { scope: String, pages: u32, total: u64 },

    #[error("Network error for {scope}: {message}")]
    NetworkError { scope: String, message: String },

    #[error("API error {status} for {scope}{}: {message}", message_suffix(.message_id))]
    ApiError {
        scope: String,
        message_id: Option<String>,
        status: u16,
        code: Option<u64>,
        message: String,
    },

    #[error("Another purge is already running in this directory")]
    RunLocked,

    #[error("Failed to acquire run lock: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

fn message_suffix(message_id: &Option<String>) -> String {
    match message_id {
        Some(id) => format!(" (message {})", id),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures that invalidate the token for every job, not just the current one.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::AuthError { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::ConfigError(format!("invalid pattern: {}", err))
    }
}
