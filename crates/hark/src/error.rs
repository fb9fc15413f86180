//! Error types for Hark

use thiserror::Error;

use crate::location::LocationError;
use crate::playback::PlaybackError;

/// Main error type for Hark operations
#[derive(Error, Debug)]
pub enum HarkError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Location tracking errors (permission, timeout, unavailable)
    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    /// Audio playback errors
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// Failures fetching nearby memories
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Failures recording play events
    #[error("Record error: {0}")]
    Record(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl From<serde_json::Error> for HarkError {
    fn from(e: serde_json::Error) -> Self {
        HarkError::Serialization(e.to_string())
    }
}

/// Result type alias for Hark operations
pub type Result<T> = std::result::Result<T, HarkError>;
