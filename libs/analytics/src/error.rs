//! Error types for the event logger.

use std::path::PathBuf;

use thiserror::Error;

/// Durable queue storage errors.
///
/// The logger never propagates these; they are logged and the queue keeps
/// working in memory.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("queue storage i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored queue could not be parsed.
    #[error("corrupt event queue: {0}")]
    Corrupt(String),

    #[error("failed to serialize event queue: {0}")]
    Serialization(String),

    #[error("queue storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the underlying request capability.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The collector could not be reached.
    #[error("collector unreachable: {0}")]
    Unreachable(String),

    /// A detached keepalive request was cancelled before it completed.
    #[error("request task aborted")]
    Aborted,
}

/// Outcome of a failed flush. The batch has already been put back at the
/// head of the queue when this is returned.
#[derive(Debug, Error)]
pub enum FlushError {
    /// `init` has not resolved an endpoint yet.
    #[error("event logger not initialized")]
    NotInitialized,

    /// The collector answered with a non-success status.
    #[error("collector rejected batch: HTTP {status}")]
    Rejected { status: u16 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
}

impl FlushError {
    /// HTTP status returned by the collector, if it answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            FlushError::Rejected { status } => Some(*status),
            _ => None,
        }
    }
}

/// Errors constructing an [`EventLogger`](crate::EventLogger).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no tokio runtime available; build the logger inside a runtime or pass a handle")]
    NoRuntime,

    #[error("failed to create HTTP transport: {0}")]
    Transport(#[from] TransportError),
}
