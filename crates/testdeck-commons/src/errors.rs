//! Shared error types for testdeck.
//!
//! Basic error variants usable across all workspace crates without
//! introducing external dependencies.

use std::fmt;

/// Common error type for testdeck operations.
#[derive(Debug, Clone)]
pub enum CommonError {
    /// Invalid input provided to a function
    InvalidInput(String),

    /// Resource not found (suite, partition, etc.)
    NotFound(String),

    /// Configuration error
    ConfigurationError(String),

    /// Internal error (unexpected state)
    Internal(String),
}

impl CommonError {
    /// Returns a short machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            CommonError::InvalidInput(_) => "INVALID_INPUT",
            CommonError::NotFound(_) => "NOT_FOUND",
            CommonError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            CommonError::Internal(_) => "INTERNAL",
        }
    }
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommonError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            CommonError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CommonError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            CommonError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CommonError {}

/// Result alias for operations returning [`CommonError`].
pub type Result<T> = std::result::Result<T, CommonError>;
