//! Persistence for editor state.
//!
//! Stores the tracker, changelog and backup catalog between runs.
//! Everything lives in `.mced/state.json` within the instance directory, as a
//! JSON object mapping each store key to its serialized value.

use mced_core::kv::{KeyValueStore, PersistError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory for editor state
pub const STATE_DIR: &str = ".mced";
/// State file within [`STATE_DIR`]
pub const STATE_FILE: &str = "state.json";

/// Key-value store backed by a JSON file. Every mutation is written through.
pub struct StateFile {
    /// Path to the storage file.
    path: PathBuf,
    /// In-memory cache.
    entries: BTreeMap<String, String>,
}

impl StateFile {
    /// Open the state file of an instance, loading it if present.
    pub fn new(instance_path: &Path) -> Result<Self> {
        let path = instance_path.join(STATE_DIR).join(STATE_FILE);
        let entries = Self::load(&path)?;
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<BTreeMap<String, String>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(path).map_err(|e| store_error(path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save current entries to disk.
    pub fn save(&self) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| store_error(parent, e))?;
        }

        let contents = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, contents).map_err(|e| store_error(&self.path, e))
    }
}

fn store_error(path: &Path, e: std::io::Error) -> PersistError {
    PersistError::Store(format!("{}: {}", path.display(), e))
}

impl KeyValueStore for StateFile {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }
}
