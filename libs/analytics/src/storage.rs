//! Durable storage for the outbound event queue.
//!
//! The queue is stored under a single key as a JSON array of events, oldest
//! first. It is rewritten after every queue mutation so that a restart picks
//! up exactly what had not been handed to the collector yet.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use storefront_events::LoggedEvent;
use tracing::debug;

use crate::StorageError;

/// Storage key for the persisted queue.
pub const STORAGE_KEY: &str = "bs_evt_queue";

/// Synchronous key-value style storage for the queue.
pub trait QueueStore: Send + Sync {
    /// Load the persisted queue. Absent storage is an empty queue.
    fn load(&self) -> Result<Vec<LoggedEvent>, StorageError>;

    /// Replace the persisted queue.
    fn save(&self, events: &[LoggedEvent]) -> Result<(), StorageError>;
}

/// Queue stored as a JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    /// Store the queue as `<dir>/bs_evt_queue.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{STORAGE_KEY}.json")),
        }
    }

    /// Store the queue at an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the persisted queue.
    pub fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl QueueStore for FileQueueStore {
    fn load(&self) -> Result<Vec<LoggedEvent>, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted event queue");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        let events: Vec<LoggedEvent> =
            serde_json::from_str(&content).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        debug!(
            path = %self.path.display(),
            queued = events.len(),
            "Loaded persisted event queue"
        );
        Ok(events)
    }

    fn save(&self, events: &[LoggedEvent]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }

        let content =
            serde_json::to_string(events).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, content).map_err(|e| self.io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(&self.path, e))?;

        Ok(())
    }
}

/// In-memory stand-in for browser local storage.
///
/// Keeps the raw serialized string, so it can be seeded with arbitrary
/// (including corrupt) content.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    raw: Mutex<Option<String>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a raw value.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    /// Current raw value under the storage key.
    pub fn raw(&self) -> Option<String> {
        self.raw
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> Result<Vec<LoggedEvent>, StorageError> {
        match self.raw() {
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, events: &[LoggedEvent]) -> Result<(), StorageError> {
        let raw =
            serde_json::to_string(events).map_err(|e| StorageError::Serialization(e.to_string()))?;
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw);
        Ok(())
    }
}
