//! JSON-file implementation of [`KeyValueStore`].
//!
//! All keys live in one JSON object, mirroring what `chrome.storage.local`
//! holds for the extension:
//!
//! ```json
//! {
//!   "countdown-minutes": 25,
//!   "timer-mode": "accumulate",
//!   "username": "NiuMa"
//! }
//! ```
//!
//! Every read loads the file again, so a value written by another process
//! (say, a second `niuma-settings` invocation) is picked up on the next read.
//! Writes go to a uniquely named sibling temp file that is then renamed over
//! the original, so a crash mid-write never leaves a truncated store behind.
//! The temp file is removed again if the write or rename fails.
//!
//! Change notifications only reach subscribers registered on the same
//! `JsonFileStore` instance.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, trace};
use uuid::Uuid;

use niuma_core::storage::{
    ChangeCallback, KeyValueStore, StoreError, SubscriberList, SubscriptionId,
};

/// Quota of `chrome.storage.local`, in bytes.
pub const DEFAULT_QUOTA_BYTES: usize = 10 * 1024 * 1024;

/// A [`KeyValueStore`] persisted as a single JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
    quota_bytes: Option<usize>,
    /// Serialises read-modify-write cycles within this process.
    file_lock: Mutex<()>,
    subscribers: SubscriberList,
}

impl JsonFileStore {
    /// Opens (or prepares to create) the store at `path`.
    ///
    /// Creates the parent directory if needed and checks that an existing file
    /// is a JSON object, so a corrupt store is reported up front rather than
    /// on the first setting access.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created or the
    /// file cannot be read, and [`StoreError::Corrupt`] if it is not a JSON
    /// object.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let store = Self {
            path,
            quota_bytes: Some(DEFAULT_QUOTA_BYTES),
            file_lock: Mutex::new(()),
            subscribers: SubscriberList::new(),
        };
        store.load()?;
        debug!(path = %store.path.display(), "opened JSON file store");
        Ok(store)
    }

    /// Sets the maximum size of the store file.  `None` disables the check.
    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn quota_bytes(&self) -> Option<usize> {
        self.quota_bytes
    }

    /// Deletes `key`, notifying subscribers with `None`.
    ///
    /// Returns the removed value.
    pub fn remove(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let removed = {
            let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut entries = self.load()?;
            let removed = entries.remove(key);
            if removed.is_some() {
                self.persist(&entries)?;
            }
            removed
        };
        if removed.is_some() {
            self.subscribers.notify(key, None);
        }
        Ok(removed)
    }

    /// Keys currently stored, in sorted order.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.keys().cloned().collect())
    }

    fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn persist(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(entries)?;
        if let Some(limit) = self.quota_bytes {
            if content.len() > limit {
                return Err(StoreError::QuotaExceeded {
                    needed: content.len(),
                    limit,
                });
            }
        }

        let tmp = temp_path(&self.path);
        let written = std::fs::write(&tmp, content)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            });
        if written.is_err() {
            std::fs::remove_file(&tmp).ok();
        }
        written?;
        trace!(path = %self.path.display(), "store file replaced");
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        {
            let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut entries = self.load()?;
            entries.insert(key.to_string(), value.clone());
            self.persist(&entries)?;
        }
        self.subscribers.notify(key, Some(value));
        Ok(())
    }

    fn subscribe(&self, key: &str, callback: ChangeCallback) -> Result<SubscriptionId, StoreError> {
        Ok(self.subscribers.add(key, callback))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.remove(id);
    }
}

/// Sibling of `path` unique to one write, so concurrent writers never share
/// a temp file.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "storage.json".into());
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
