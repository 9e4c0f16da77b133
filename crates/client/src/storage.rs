//! Key-value persistence for session data.
//!
//! [`FileStore`] keeps one JSON file per key in the platform config directory:
//!   - Linux: `~/.config/banter/`
//!   - macOS: `~/Library/Application Support/banter/`
//!   - Windows: `%APPDATA%\banter\`
//!
//! [`MemoryStore`] backs tests and ephemeral sessions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use banter_shared::ChatError;

/// Minimal get/set/remove interface over a string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), ChatError>;
    fn remove(&self, key: &str);
}

/// File-per-key store rooted in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `<config dir>/banter`.
    pub fn in_config_dir() -> Result<Self, ChatError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ChatError::Storage("no config directory on this platform".into()))?;
        Ok(Self::new(config_dir.join("banter")))
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.root.join(format!("{}.json", safe_key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ChatError> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| ChatError::Storage(format!("create {}: {e}", self.root.display())))?;
        let path = self.file_path(key);
        std::fs::write(&path, value)
            .map_err(|e| ChatError::Storage(format!("write {}: {e}", path.display())))
    }

    fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ChatError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }
}
