//! Error types for the Waypost engine.

use thiserror::Error;

/// All possible errors from the Waypost engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("invalid record id '{id}': {reason}")]
    InvalidId { id: String, reason: &'static str },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    // Configuration errors
    #[error("invalid media origin '{0}': must be an absolute origin such as https://example.com")]
    InvalidOrigin(String),
}

impl Error {
    /// Whether this error came from validating caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MissingRequiredField(_) | Error::InvalidId { .. }
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
