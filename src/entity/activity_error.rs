use std::time::Duration;

/// Errors of the activity sync subsystem.
///
/// Cloneable so that a single in-flight sync can hand the same result to every waiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActivityError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid event payload: {0}")]
    InvalidEvent(String),

    #[error("Event stream closed by server")]
    StreamClosed,

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for ActivityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ActivityError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ActivityError::Backend {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ActivityError::Network(e.to_string())
        }
    }
}

impl From<sqlx::Error> for ActivityError {
    fn from(e: sqlx::Error) -> Self {
        ActivityError::Storage(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ActivityError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        ActivityError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ActivityError {
    fn from(e: serde_json::Error) -> Self {
        ActivityError::Decode(e.to_string())
    }
}

impl From<config::ConfigError> for ActivityError {
    fn from(e: config::ConfigError) -> Self {
        ActivityError::Config(e.to_string())
    }
}

pub type ActivityResult<T> = Result<T, ActivityError>;
