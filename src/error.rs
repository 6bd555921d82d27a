//! Error types for the shelter board.

use thiserror::Error;

/// Main error type for board operations.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Shelter fetch failed: {0}")]
    Fetch(String),

    #[error("Override fetch failed for {shelter_id}: {reason}")]
    OverrideFetch { shelter_id: String, reason: String },

    #[error("Override persist failed for {shelter_id}: {reason}")]
    Persist { shelter_id: String, reason: String },

    #[error("API mirror failed: {0}")]
    Mirror(String),

    #[error("{email} is not allowed to edit shelter {shelter_id}")]
    Unauthorized { email: String, shelter_id: String },

    #[error("{0} is not an administrator")]
    NotAdmin(String),

    #[error("Invalid email: {0:?}")]
    InvalidEmail(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sync gateway is closed")]
    SyncClosed,
}

impl From<serde_json::Error> for BoardError {
    fn from(e: serde_json::Error) -> Self {
        BoardError::Serialization(e.to_string())
    }
}

/// Result type for board operations.
pub type Result<T> = std::result::Result<T, BoardError>;
