//! ChangeTracker: what changed since load, per `(entity, setting)`.
//!
//! The first observation of a setting fixes its baseline. Later edits only move
//! `current_value`; the record reports modified while the two differ.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use tracing::debug;

use crate::kv::{self, KeyValueStore};

/// Key the tracker table is persisted under.
pub const STORAGE_KEY: &str = "mced-change-tracking";

/// Identifies one setting of one entity (usually a mod).
///
/// Displays as `entity:setting`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeKey {
    pub entity_id: String,
    pub setting_key: String,
}

impl ChangeKey {
    pub fn new(entity_id: impl Into<String>, setting_key: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            setting_key: setting_key.into(),
        }
    }
}

impl Display for ChangeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_id, self.setting_key)
    }
}

/// Tracked state of a single setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Value seen the first time the setting was tracked
    pub original_value: Value,
    /// Latest value
    pub current_value: Value,
    pub is_modified: bool,
    /// When the setting was last changed away from its baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Table of tracked settings.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    changes: BTreeMap<ChangeKey, ChangeRecord>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit of `entity_id`/`setting_key`.
    ///
    /// `original_value` is only used the first time a key is seen; after that
    /// the stored baseline wins until the key is reset.
    pub fn track(
        &mut self,
        entity_id: &str,
        setting_key: &str,
        original_value: Value,
        current_value: Value,
    ) {
        let key = ChangeKey::new(entity_id, setting_key);
        let original_value = match self.changes.remove(&key) {
            Some(existing) => existing.original_value,
            None => original_value,
        };

        let is_modified = !values_equal(&original_value, &current_value);
        debug!("Tracked {} (modified: {})", key, is_modified);

        self.changes.insert(
            key,
            ChangeRecord {
                original_value,
                current_value,
                is_modified,
                modified_at: is_modified.then(Utc::now),
            },
        );
    }

    /// Drop the record and hand back its baseline, or `None` if untracked.
    ///
    /// Writing the value back into the document is up to the caller.
    pub fn reset_to_default(&mut self, entity_id: &str, setting_key: &str) -> Option<Value> {
        self.changes
            .remove(&ChangeKey::new(entity_id, setting_key))
            .map(|record| record.original_value)
    }

    pub fn is_modified(&self, entity_id: &str, setting_key: &str) -> bool {
        self.get(entity_id, setting_key)
            .is_some_and(|record| record.is_modified)
    }

    pub fn get_original_value(&self, entity_id: &str, setting_key: &str) -> Option<&Value> {
        self.get(entity_id, setting_key)
            .map(|record| &record.original_value)
    }

    pub fn get(&self, entity_id: &str, setting_key: &str) -> Option<&ChangeRecord> {
        self.changes.get(&ChangeKey::new(entity_id, setting_key))
    }

    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    pub fn get_modified_count(&self) -> usize {
        self.changes.values().filter(|r| r.is_modified).count()
    }

    /// All records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ChangeKey, &ChangeRecord)> {
        self.changes.iter()
    }

    /// Records belonging to one entity.
    pub fn records_for<'a>(
        &'a self,
        entity_id: &'a str,
    ) -> impl Iterator<Item = (&'a ChangeKey, &'a ChangeRecord)> + 'a {
        self.changes
            .iter()
            .filter(move |(key, _)| key.entity_id == entity_id)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Persist the table under [`STORAGE_KEY`].
    pub fn save(&self, store: &mut dyn KeyValueStore) -> kv::Result<()> {
        let persisted = PersistedChanges {
            changes: self
                .changes
                .iter()
                .map(|(key, record)| PersistedChange {
                    entity_id: key.entity_id.clone(),
                    setting_key: key.setting_key.clone(),
                    record: record.clone(),
                })
                .collect(),
        };
        store.set(STORAGE_KEY, serde_json::to_string(&persisted)?)
    }

    /// Rebuild a tracker from [`STORAGE_KEY`]; empty if nothing was saved.
    pub fn load(store: &dyn KeyValueStore) -> kv::Result<Self> {
        let Some(raw) = store.get(STORAGE_KEY)? else {
            return Ok(Self::new());
        };

        let persisted: PersistedChanges = serde_json::from_str(&raw)?;
        let changes = persisted
            .changes
            .into_iter()
            .map(|entry| {
                let mut record = entry.record;
                // Derived field; don't trust what was written
                record.is_modified = !values_equal(&record.original_value, &record.current_value);
                if !record.is_modified {
                    record.modified_at = None;
                }
                (ChangeKey::new(entry.entity_id, entry.setting_key), record)
            })
            .collect();

        Ok(Self { changes })
    }
}

/// Whether two setting values are the same.
///
/// Numbers compare by value, so `1` and `1.0` are equal. Object key order is
/// ignored.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => {
            x.as_f64() == y.as_f64()
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Serialized form: an ordered list of key/record pairs.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedChanges {
    changes: Vec<PersistedChange>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedChange {
    entity_id: String,
    setting_key: String,
    record: ChangeRecord,
}
