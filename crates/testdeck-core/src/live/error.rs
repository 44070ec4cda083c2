//! Error types for the change-feed core.

use testdeck_commons::CommonError;
use testdeck_store::StorageError;
use thiserror::Error;

/// Errors that can occur in change-feed and suite repository operations.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored entry could not be decoded. Fatal to the read that hit
    /// it; a window silently missing an entity would let consumers act on
    /// incomplete state.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl From<CommonError> for FeedError {
    fn from(e: CommonError) -> Self {
        match e {
            CommonError::NotFound(msg) => FeedError::NotFound(msg),
            CommonError::InvalidInput(msg) => FeedError::InvalidInput(msg),
            other => FeedError::InvalidInput(other.to_string()),
        }
    }
}

/// Result type for change-feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
