//! Conversation Memory
//!
//! A bounded, durable log of the exchanges the assistant had with a language
//! model. Entries are kept in insertion order; once the log grows past
//! `max_items` the oldest entries are dropped first. The whole log is
//! rewritten to disk after every append.
//!
//! # File Format
//!
//! ```json
//! {
//!   "conversations": [
//!     {"ts": "2024-05-01T09:30:00.123456Z", "user": "gpt: hi", "assistant": "Hello!"}
//!   ],
//!   "last_topic": "gpt: hi"
//! }
//! ```
//!
//! # Durability
//!
//! Writes go to `<file>.tmp` first, are flushed to disk, then renamed over
//! the real file, so a reader only ever sees the old or the new content.
//! A failed write is logged and the in-memory log stays authoritative; the
//! next append writes the full log again.

use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// One remembered exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub ts: DateTime<Utc>,
    pub user: String,
    pub assistant: String,
}

/// On-disk shape of the memory file
#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryFile {
    #[serde(default)]
    conversations: Vec<MemoryEntry>,

    #[serde(default)]
    last_topic: Option<String>,
}

/// Bounded conversation log mirrored to a JSON file
#[derive(Debug)]
pub struct MemoryStore {
    path: PathBuf,
    max_items: usize,
    entries: Vec<MemoryEntry>,
    last_topic: Option<String>,
}

impl MemoryStore {
    /// Create an empty store that will persist to `path`
    pub fn new(path: impl Into<PathBuf>, max_items: usize) -> Self {
        Self {
            path: path.into(),
            max_items: max_items.max(1),
            entries: Vec::new(),
            last_topic: None,
        }
    }

    /// Load the store from `path`
    ///
    /// A missing file yields an empty store. Unreadable or malformed content
    /// is logged and also yields an empty store; this never fails.
    pub fn load(path: impl Into<PathBuf>, max_items: usize) -> Self {
        let mut store = Self::new(path, max_items);

        if !store.path.exists() {
            debug!("No memory file at {:?}, starting fresh", store.path);
            return store;
        }

        let parsed = fs::read_to_string(&store.path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<MemoryFile>(&raw).map_err(|e| e.to_string()));

        match parsed {
            Ok(file) => {
                store.entries = file.conversations;
                store.last_topic = file.last_topic;
                store.enforce_bound();
                debug!(
                    "Loaded {} remembered exchanges from {:?}",
                    store.entries.len(),
                    store.path
                );
            }
            Err(e) => {
                error!("Failed to load memory file {:?}: {}", store.path, e);
            }
        }

        store
    }

    /// Remember one exchange and persist the log
    ///
    /// Never fails: a persistence error is logged and the in-memory log
    /// keeps the new entry.
    pub fn append(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.append_at(user.into(), assistant.into(), Utc::now());

        if let Err(e) = self.save() {
            error!("{}", e);
        }
    }

    fn append_at(&mut self, user: String, assistant: String, now: DateTime<Utc>) {
        // Timestamps never go backwards, even if the wall clock does.
        let ts = match self.entries.last() {
            Some(last) if last.ts > now => last.ts,
            _ => now,
        };

        self.last_topic = Some(user.clone());
        self.entries.push(MemoryEntry {
            ts,
            user,
            assistant,
        });
        self.enforce_bound();
    }

    /// The user text of the most recent exchange
    pub fn last_topic(&self) -> Option<&str> {
        self.last_topic.as_deref()
    }

    /// All remembered exchanges, oldest first
    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// The newest `n` exchanges, oldest first
    pub fn recent(&self, n: usize) -> &[MemoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full log atomically
    ///
    /// # Errors
    /// Returns `EngineError::Persistence` if any step of the write fails.
    /// The real file is untouched in that case.
    pub fn save(&self) -> Result<(), EngineError> {
        let snapshot = MemoryFile {
            conversations: self.entries.clone(),
            last_topic: self.last_topic.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| EngineError::Persistence(format!("Failed to serialize memory: {}", e)))?;

        write_atomic(&self.path, &bytes).map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to save memory to {:?}: {}",
                self.path, e
            ))
        })
    }

    fn enforce_bound(&mut self) {
        if self.entries.len() > self.max_items {
            let excess = self.entries.len() - self.max_items;
            self.entries.drain(..excess);
        }
    }
}

/// Temporary sibling used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() && tmp.exists() {
        if let Err(e) = fs::remove_file(&tmp) {
            warn!("Failed to remove stale {:?}: {}", tmp, e);
        }
    }

    result
}
