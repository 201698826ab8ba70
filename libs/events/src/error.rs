//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when handling events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The event name is not part of the known vocabulary.
    #[error("unknown event name: {0}")]
    UnknownEventName(String),

    /// A property key was empty.
    #[error("invalid property: {0}")]
    InvalidProperty(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
