//! Conversation Persistence
//!
//! Conversations are persisted as one JSON array under a fixed storage key.
//! Timestamps are written as ISO-8601 strings and the transient streaming
//! flag is never written (see [`Message`](crate::conversation::Message)).
//!
//! Persistence failures never interrupt the chat flow: the store logs them
//! and keeps working from memory. The backends therefore only report errors,
//! they never retry.
//!
//! Backends are synchronous. Inside a tokio runtime the store hands writes
//! to a [`StorageWriter`], which runs them on the blocking pool so a save
//! never stalls the executor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::conversation::Conversation;

/// Key under which the conversation list is stored
pub const STORAGE_KEY: &str = "realtime-ai-chat-conversations";

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing medium failed
    #[error("Storage I/O failed at {path}: {source}")]
    Io {
        /// Location that was accessed
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Stored data could not be encoded or decoded
    #[error("Failed to (de)serialize conversations: {0}")]
    Serde(#[from] serde_json::Error),

    /// The write would exceed the available storage space
    #[error("Storage quota exceeded: {required} bytes needed, {quota} available")]
    QuotaExceeded {
        /// Size of the rejected write
        required: usize,
        /// Configured quota
        quota: usize,
    },
}

/// A place conversations are saved to and restored from
pub trait ConversationStorage: Send + Sync {
    /// Load all stored conversations (empty if nothing was stored yet)
    ///
    /// # Errors
    ///
    /// Returns an error if stored data exists but cannot be read or decoded.
    fn load(&self) -> Result<Vec<Conversation>, StorageError>;

    /// Replace the stored conversations
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be written.
    fn save(&self, conversations: &[Conversation]) -> Result<(), StorageError>;

    /// Remove everything stored under the key
    ///
    /// # Errors
    ///
    /// Returns an error if the stored data cannot be removed.
    fn clear(&self) -> Result<(), StorageError>;
}

// ============================================================================
// File Storage
// ============================================================================

/// JSON file storage: `<dir>/<key>.json`
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage for the default key inside `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_key(dir, STORAGE_KEY)
    }

    /// Storage for a custom key inside `dir`
    pub fn with_key(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{key}.json")),
        }
    }

    /// Full path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConversationStorage for FileStorage {
    fn load(&self) -> Result<Vec<Conversation>, StorageError> {
        let serialized = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if serialized.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(&serialized)?)
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(conversations)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        // Write-then-rename: the file is never observed half written
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

// ============================================================================
// Memory Storage
// ============================================================================

/// In-memory key/value storage with an optional byte quota
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Unlimited in-memory storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes larger than `quota` bytes
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    /// Raw serialized value under the storage key
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.entries.lock().get(STORAGE_KEY).cloned()
    }

    /// Overwrite the raw serialized value (for corrupt-data scenarios)
    pub fn set_raw(&self, value: impl Into<String>) {
        self.entries.lock().insert(STORAGE_KEY.to_string(), value.into());
    }
}

impl ConversationStorage for MemoryStorage {
    fn load(&self) -> Result<Vec<Conversation>, StorageError> {
        match self.entries.lock().get(STORAGE_KEY) {
            Some(serialized) => Ok(serde_json::from_str(serialized)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, conversations: &[Conversation]) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(conversations)?;
        if let Some(quota) = self.quota {
            if serialized.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    required: serialized.len(),
                    quota,
                });
            }
        }
        self.entries.lock().insert(STORAGE_KEY.to_string(), serialized);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.entries.lock().remove(STORAGE_KEY);
        Ok(())
    }
}

// ============================================================================
// Background Writer
// ============================================================================

/// A write handed to the [`StorageWriter`]
#[derive(Debug)]
pub enum PendingWrite {
    /// Replace the stored conversations
    Save(Vec<Conversation>),
    /// Remove everything stored under the key
    Clear,
}

impl PendingWrite {
    pub(crate) fn apply(&self, storage: &dyn ConversationStorage) -> Result<(), StorageError> {
        match self {
            Self::Save(conversations) => storage.save(conversations),
            Self::Clear => storage.clear(),
        }
    }
}

#[derive(Clone, Debug)]
struct WriteRequest {
    version: u64,
    write: Arc<PendingWrite>,
}

/// Applies writes to a storage backend on the blocking pool
///
/// Requests go through a watch channel: a burst of saves while a write is
/// in progress collapses into one write of the latest state. A single task
/// drains the channel, so writes land in the order they were submitted.
#[derive(Debug)]
pub struct StorageWriter {
    requests: watch::Sender<Option<WriteRequest>>,
    written: watch::Receiver<u64>,
    submitted: u64,
}

impl StorageWriter {
    /// Start a writer task for `storage` on the given runtime
    pub fn spawn(storage: Arc<dyn ConversationStorage>, handle: &Handle) -> Self {
        let (requests, requests_rx) = watch::channel(None);
        let (written_tx, written) = watch::channel(0);
        handle.spawn(run_writer(storage, requests_rx, written_tx));

        Self {
            requests,
            written,
            submitted: 0,
        }
    }

    /// Queue a write, replacing any write not yet started
    pub fn submit(&mut self, write: PendingWrite) {
        self.submitted += 1;
        self.requests.send_replace(Some(WriteRequest {
            version: self.submitted,
            write: Arc::new(write),
        }));
    }

    /// Wait until everything submitted so far is written
    pub async fn flush(&mut self) {
        let target = self.submitted;
        if self.written.wait_for(|version| *version >= target).await.is_err() {
            tracing::warn!("Storage writer stopped before flushing");
        }
    }
}

async fn run_writer(
    storage: Arc<dyn ConversationStorage>,
    mut requests: watch::Receiver<Option<WriteRequest>>,
    written: watch::Sender<u64>,
) {
    while requests.changed().await.is_ok() {
        let Some(request) = requests.borrow_and_update().clone() else {
            continue;
        };

        let storage = Arc::clone(&storage);
        let write = Arc::clone(&request.write);
        match tokio::task::spawn_blocking(move || write.apply(storage.as_ref())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => report_write_error(&e),
            Err(e) => tracing::error!(error = %e, "Storage write task failed"),
        }

        written.send_replace(request.version);
    }

    tracing::debug!("Storage writer stopped");
}

/// Log a failed write; the in-memory state stays authoritative
pub(crate) fn report_write_error(error: &StorageError) {
    tracing::error!(error = %error, "Failed to save conversations");
    if matches!(error, StorageError::QuotaExceeded { .. }) {
        tracing::warn!("Storage quota exceeded. Consider clearing old conversations.");
    }
}
