//! Key-value persistence for settings, pending authorizations, sessions and
//! the debug log
//!
//! The auth core treats storage as an opaque, unordered string-to-string
//! map with no transactional guarantees. Two implementations are provided:
//! [`MemoryStore`] for tests and throwaway sessions, and [`SledStore`] backed
//! by an embedded `sled` database in the user's data directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TokenProbeError};

/// Minimal key-value contract used by every persistent component.
///
/// Reads never fail: a backend error or missing key both yield `None`.
/// Writes report failures so callers can decide whether to surface them.
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored string for `key`, or `None` when absent or unreadable.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Reads `key` and decodes it as JSON.
///
/// Absent keys and undecodable values both produce `None`; the latter is
/// logged at warn level.
///
/// # Examples
///
/// ```
/// use tokenprobe::storage::{load_json, save_json, MemoryStore};
///
/// let store = MemoryStore::new();
/// save_json(&store, "numbers", &vec![1, 2, 3]).unwrap();
/// let loaded: Option<Vec<u32>> = load_json(&store, "numbers");
/// assert_eq!(loaded, Some(vec![1, 2, 3]));
/// ```
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Ignoring undecodable stored value");
            None
        }
    }
}

/// Encodes `value` as JSON and stores it under `key`.
///
/// # Errors
///
/// Returns `TokenProbeError::Storage` if serialization or the write fails.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| TokenProbeError::Storage(format!("Serialization failed: {}", e)))?;
    store.set(key, &raw)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store that forgets everything on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true when no keys are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| TokenProbeError::Storage("Memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| TokenProbeError::Storage("Memory store lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SledStore
// ---------------------------------------------------------------------------

/// Durable store backed by an embedded `sled` database.
///
/// Every write is flushed before returning so a browser-style redirect
/// (process exit, later restart) never loses the pending state.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Opens or creates a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns `TokenProbeError::Storage` if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokenprobe::storage::{KeyValueStore, SledStore};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SledStore::open(dir.path().join("store")).unwrap();
    /// store.set("greeting", "hello").unwrap();
    /// assert_eq!(store.get("greeting").as_deref(), Some("hello"));
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| TokenProbeError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    /// Opens the store in the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns `TokenProbeError::Storage` if the data directory cannot be
    /// determined or created.
    pub fn open_default() -> Result<Self> {
        Self::open(default_store_path()?)
    }
}

/// Location of the default store: `<data dir>/tokenprobe/store`.
pub fn default_store_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "tokenprobe", "tokenprobe")
        .ok_or_else(|| TokenProbeError::Storage("Could not determine data directory".into()))?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir).map_err(|e| {
        TokenProbeError::Storage(format!("Failed to create data directory: {}", e))
    })?;

    Ok(data_dir.join("store"))
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Stored value is not valid UTF-8");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Store read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| TokenProbeError::Storage(format!("Insert failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| TokenProbeError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| TokenProbeError::Storage(format!("Remove failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| TokenProbeError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }
}
