//! Persistent storage for promptdeck
//!
//! Every record lives under a fixed namespace prefix so that clearing our data
//! never touches anything else sharing the same backend:
//!
//! <data_dir>/
//! ├── promptdeck_config.json         # Provider keys and models
//! ├── promptdeck_history.json        # Per-provider prompt/response buckets
//! └── promptdeck_usage_stats.json    # Usage counters
//!
//! [`SafeStore`] is the only component that talks to a [`KvBackend`]. It never
//! returns an error: reads fall back to a caller-supplied value and writes
//! report success as a `bool`.

pub mod history;
pub mod usage;

pub use history::{FlattenedEntry, History, HistoryEntry, HistoryStore};
pub use usage::{UsageCounters, UsageTracker};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Prefix applied to every key we write
pub const STORAGE_PREFIX: &str = "promptdeck_";

/// Backend failures. These never escape [`SafeStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend refused access entirely (read-only media, sandbox, test switch)
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw string key-value storage
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    /// All keys currently present, namespaced or not
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// One JSON file per key inside a data directory
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// The directory is created lazily on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    fn tmp_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json.tmp", key))
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        std::fs::create_dir_all(&self.root).map_err(io_err)?;

        // Write-then-rename so a crash never leaves a half-written record
        let path = self.path_for(key);
        let tmp = self.tmp_path_for(key);
        let written = std::fs::write(&tmp, value).and_then(|()| std::fs::rename(&tmp, &path));
        if written.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        written.map_err(io_err)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        // Leftover from an interrupted write
        let _ = std::fs::remove_file(self.tmp_path_for(key));
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    key: self.root.display().to_string(),
                    source,
                })
            }
        };

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            // A lone `.json.tmp` is an interrupted first write; list it so
            // `remove` can clean it up
            let key = name.to_str().and_then(|n| {
                n.strip_suffix(".json")
                    .or_else(|| n.strip_suffix(".json.tmp"))
            });
            if let Some(key) = key {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

/// In-process backend for tests and embedders that keep nothing on disk
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, like storage denied by the host
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Write a raw value, bypassing serialization (for corrupt-data scenarios)
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.into(), value.into());
        }
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("access denied".to_string()))
        } else {
            Ok(())
        }
    }

    fn with_entries<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> R,
    ) -> Result<R, StorageError> {
        self.check()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store poisoned".to_string()))?;
        Ok(f(&mut entries))
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_entries(|e| e.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_entries(|e| {
            e.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entries(|e| {
            e.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.with_entries(|e| {
            let mut keys: Vec<String> = e.keys().cloned().collect();
            keys.sort();
            keys
        })
    }
}

/// Fail-soft, namespaced JSON store
///
/// Cheap to clone; all clones share the same backend.
#[derive(Clone)]
pub struct SafeStore {
    backend: Arc<dyn KvBackend>,
    prefix: String,
}

impl SafeStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            prefix: STORAGE_PREFIX.to_string(),
        }
    }

    /// Store backed by JSON files in `dir`
    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileBackend::new(dir)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn try_load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let full_key = self.namespaced(key);
        match self.backend.get(&full_key)? {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Corrupt {
                    key: full_key,
                    source,
                }),
            _ => Ok(None),
        }
    }

    /// Read `key`, returning `fallback` when it is absent or unreadable
    pub fn load<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.try_load(key) {
            Ok(Some(value)) => value,
            Ok(None) => fallback,
            Err(e) => {
                tracing::warn!(key, error = %e, "Storage read failed, using fallback");
                fallback
            }
        }
    }

    /// Serialize and write `value`; `false` if anything went wrong
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to serialize record");
                return false;
            }
        };

        match self.backend.set(&self.namespaced(key), &raw) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cannot save record");
                false
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.backend.remove(&self.namespaced(key)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cannot remove record");
                false
            }
        }
    }

    /// Remove every namespaced record, leaving foreign keys alone
    pub fn clear(&self) -> bool {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot list records");
                return false;
            }
        };

        let mut ok = true;
        for key in keys.iter().filter(|k| k.starts_with(&self.prefix)) {
            if let Err(e) = self.backend.remove(key) {
                tracing::warn!(key = key.as_str(), error = %e, "Cannot remove record");
                ok = false;
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    fn sample() -> Sample {
        Sample {
            name: "demo".to_string(),
            count: 3,
        }
    }

    #[test]
    fn test_load_missing_returns_fallback() {
        let store = SafeStore::in_memory();
        assert_eq!(store.load("nothing", 42u32), 42);
    }

    #[test]
    fn test_save_then_load() {
        let store = SafeStore::in_memory();
        assert!(store.save("sample", &sample()));
        let loaded: Sample = store.load(
            "sample",
            Sample {
                name: String::new(),
                count: 0,
            },
        );
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_unavailable_backend_never_errors() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SafeStore::new(backend.clone());
        assert!(store.save("sample", &sample()));

        backend.set_unavailable(true);
        assert_eq!(store.load("sample", 7u32), 7);
        assert!(!store.save("sample", &sample()));
        assert!(!store.remove("sample"));
        assert!(!store.clear());

        backend.set_unavailable(false);
        let loaded: Option<Sample> = store.load("sample", None);
        assert_eq!(loaded, Some(sample()));
    }

    #[test]
    fn test_corrupt_record_returns_fallback() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw(format!("{}sample", STORAGE_PREFIX), "{not json");
        let store = SafeStore::new(backend);
        assert_eq!(store.load("sample", vec![1, 2]), vec![1, 2]);
    }

    #[test]
    fn test_clear_only_touches_namespace() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_raw("other_app_setting", "\"keep me\"");
        let store = SafeStore::new(backend.clone());
        store.save("config", &sample());
        store.save("history", &sample());

        assert!(store.clear());

        let keys = backend.keys().unwrap();
        assert_eq!(keys, vec!["other_app_setting".to_string()]);
    }

    #[test]
    fn test_remove_single_key() {
        let store = SafeStore::in_memory();
        store.save("a", &1u32);
        store.save("b", &2u32);
        assert!(store.remove("a"));
        assert_eq!(store.load("a", 0u32), 0);
        assert_eq!(store.load("b", 0u32), 2);
    }

    #[test]
    fn test_file_backend_roundtrip() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("data");
        let store = SafeStore::file(&dir);

        // Nothing on disk yet
        assert_eq!(store.load("sample", 0u32), 0);
        assert!(store.save("sample", &sample()));
        assert!(dir.join("promptdeck_sample.json").exists());

        let reopened = SafeStore::file(&dir);
        let loaded: Option<Sample> = reopened.load("sample", None);
        assert_eq!(loaded, Some(sample()));
    }

    #[test]
    fn test_file_backend_clear_keeps_foreign_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes.json"), "{}").unwrap();
        let store = SafeStore::file(temp.path());
        store.save("config", &sample());

        assert!(store.clear());
        assert!(!temp.path().join("promptdeck_config.json").exists());
        assert!(temp.path().join("notes.json").exists());
    }

    #[test]
    fn test_file_backend_corrupt_file_returns_fallback() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("promptdeck_usage_stats.json"), "garbage").unwrap();
        let store = SafeStore::file(temp.path());
        assert_eq!(store.load("usage_stats", 5u64), 5);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_leaves_no_tmp_file() {
        let temp = TempDir::new().unwrap();
        // A non-empty directory where the record should go makes the rename fail
        let blocker = temp.path().join("promptdeck_config.json");
        std::fs::create_dir_all(&blocker).unwrap();
        std::fs::write(blocker.join("inner"), "x").unwrap();

        let store = SafeStore::file(temp.path());
        assert!(!store.save("config", &sample()));
        assert!(!temp.path().join("promptdeck_config.json.tmp").exists());
    }

    #[test]
    fn test_clear_removes_stale_tmp_files() {
        let temp = TempDir::new().unwrap();
        let store = SafeStore::file(temp.path());
        store.save("history", &sample());
        std::fs::write(temp.path().join("promptdeck_history.json.tmp"), "{").unwrap();
        std::fs::write(temp.path().join("promptdeck_usage_stats.json.tmp"), "{").unwrap();

        assert!(store.clear());
        assert!(!temp.path().join("promptdeck_history.json").exists());
        assert!(!temp.path().join("promptdeck_history.json.tmp").exists());
        assert!(!temp.path().join("promptdeck_usage_stats.json.tmp").exists());
    }

    #[test]
    fn test_file_backend_remove_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        let store = SafeStore::file(temp.path());
        assert!(store.remove("never_written"));
    }
}
