//! Key-value string store used to persist editor state between sessions.
//!
//! Each persisted component owns one key and stores a JSON document under it.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// A string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: String) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory store, for tests and for callers that don't need durability.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKv {
    entries: HashMap<String, String>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
