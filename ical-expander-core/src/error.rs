//! Error types for calendar expansion.

use thiserror::Error;

/// Errors that can occur while loading or expanding a calendar.
#[derive(Error, Debug)]
pub enum ExpanderError {
    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("Invalid {property} on event '{uid}': {reason}")]
    InvalidDate {
        uid: String,
        property: &'static str,
        reason: String,
    },

    #[error("Invalid recurrence on event '{uid}': {message}")]
    Recurrence { uid: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExpanderError {
    pub(crate) fn invalid_date(uid: &str, property: &'static str, reason: impl Into<String>) -> Self {
        ExpanderError::InvalidDate {
            uid: uid.to_string(),
            property,
            reason: reason.into(),
        }
    }
}

/// Result type alias for expander operations.
pub type ExpanderResult<T> = Result<T, ExpanderError>;
