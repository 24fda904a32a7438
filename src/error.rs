//! Error types for the detection pipeline.

use std::time::Duration;
use thiserror::Error;

/// Failures of the windowed counter store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("window store unavailable: {0}")]
    Unavailable(String),

    #[error("window store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("key {key} holds a {found} value, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("key {key} holds an unparsable value: {value}")]
    Corrupt { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed action event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("moderation queue error: {0}")]
    Queue(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("trust lookup failed for {user_id}: {message}")]
    TrustLookup { user_id: uuid::Uuid, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Errors that only affect a single event or sub-score.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedEvent(_)
                | Self::Store(StoreError::Timeout(_))
                | Self::TrustLookup { .. }
                | Self::Queue(_)
        )
    }
}
