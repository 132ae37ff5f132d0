//! Audit log of individual setting edits, grouped by editing session.
//!
//! Newest entries first, capped at [`MAX_ENTRIES`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::kv::{self, KeyValueStore};

/// Key the changelog is persisted under.
pub const STORAGE_KEY: &str = "mced-changelog";
/// Entries kept; older ones fall off the end.
pub const MAX_ENTRIES: usize = 1000;
/// Session id recorded when no session was started.
pub const UNKNOWN_SESSION: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub mod_id: String,
    pub mod_name: String,
    pub setting_key: String,
    pub config_file: String,
    pub old_value: Value,
    pub new_value: Value,
    /// `string`, `number`, `boolean`, `array`, `object` or `null`
    pub value_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeLog {
    /// Newest first
    entries: Vec<ChangeLogEntry>,
    current_session_id: Option<String>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_change(
        &mut self,
        mod_id: &str,
        mod_name: &str,
        setting_key: &str,
        config_file: &str,
        old_value: Value,
        new_value: Value,
    ) {
        let entry = ChangeLogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            session_id: self
                .current_session_id
                .clone()
                .unwrap_or_else(|| UNKNOWN_SESSION.to_string()),
            mod_id: mod_id.to_string(),
            mod_name: mod_name.to_string(),
            setting_key: setting_key.to_string(),
            config_file: config_file.to_string(),
            value_type: value_type(&new_value).to_string(),
            old_value,
            new_value,
        };

        self.entries.insert(0, entry);
        self.entries.truncate(MAX_ENTRIES);
    }

    pub fn start_session(&mut self, session_id: impl Into<String>) {
        self.current_session_id = Some(session_id.into());
    }

    pub fn current_session(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    pub fn session_changes(&self, session_id: &str) -> Vec<&ChangeLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.session_id == session_id)
            .collect()
    }

    /// Distinct session ids, sorted descending.
    pub fn sessions(&self) -> Vec<&str> {
        let sessions: BTreeSet<&str> = self.entries.iter().map(|e| e.session_id.as_str()).collect();
        sessions.into_iter().rev().collect()
    }

    pub fn changes_by_mod(&self, mod_id: &str) -> Vec<&ChangeLogEntry> {
        self.entries.iter().filter(|e| e.mod_id == mod_id).collect()
    }

    pub fn recent(&self, limit: usize) -> &[ChangeLogEntry] {
        &self.entries[..limit.min(self.entries.len())]
    }

    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty-printed JSON array of every entry, newest first.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_session_id = None;
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> kv::Result<()> {
        store.set(STORAGE_KEY, serde_json::to_string(self)?)
    }

    pub fn load(store: &dyn KeyValueStore) -> kv::Result<Self> {
        match store.get(STORAGE_KEY)? {
            Some(raw) => {
                let mut log: Self = serde_json::from_str(&raw)?;
                log.entries.truncate(MAX_ENTRIES);
                Ok(log)
            }
            None => Ok(Self::new()),
        }
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;
    use serde_json::json;

    fn log_fov(log: &mut ChangeLog, from: i64, to: i64) {
        log.log_change("minecraft", "Minecraft", "fov", "options.txt", json!(from), json!(to));
    }

    #[test]
    fn test_newest_first() {
        let mut log = ChangeLog::new();
        log_fov(&mut log, 70, 80);
        log_fov(&mut log, 80, 90);

        assert_eq!(log.entries()[0].new_value, json!(90));
        assert_eq!(log.entries()[1].new_value, json!(80));
        assert_eq!(log.entries()[0].value_type, "number");
        assert_eq!(log.entries()[0].session_id, UNKNOWN_SESSION);
    }

    #[test]
    fn test_bounded() {
        let mut log = ChangeLog::new();
        for i in 0..(MAX_ENTRIES as i64 + 25) {
            log_fov(&mut log, i, i + 1);
        }
        assert_eq!(log.len(), MAX_ENTRIES);
        assert_eq!(log.entries()[0].new_value, json!(MAX_ENTRIES as i64 + 25));
    }

    #[test]
    fn test_sessions_and_filters() {
        let mut log = ChangeLog::new();
        log.start_session("2026-10-18");
        log_fov(&mut log, 70, 80);
        log.start_session("2026-10-19");
        log_fov(&mut log, 80, 90);
        log.log_change("jei", "JEI", "cheatMode", "jei-client.toml", json!(false), json!(true));

        assert_eq!(log.current_session(), Some("2026-10-19"));
        assert_eq!(log.sessions(), vec!["2026-10-19", "2026-10-18"]);
        assert_eq!(log.session_changes("2026-10-19").len(), 2);
        assert_eq!(log.changes_by_mod("jei").len(), 1);
        assert_eq!(log.changes_by_mod("jei")[0].value_type, "boolean");
        assert_eq!(log.recent(2).len(), 2);
        assert_eq!(log.recent(50).len(), 3);
    }

    #[test]
    fn test_export_and_clear() {
        let mut log = ChangeLog::new();
        log.start_session("s1");
        log_fov(&mut log, 70, 80);

        let exported: Value = serde_json::from_str(&log.export_json().unwrap()).unwrap();
        assert_eq!(exported.as_array().unwrap().len(), 1);
        assert_eq!(exported[0]["setting_key"], "fov");
        assert!(exported[0]["timestamp"].as_str().unwrap().contains('T'));

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.current_session(), None);
    }

    #[test]
    fn test_save_and_load() {
        let mut store = InMemoryKv::new();
        let mut log = ChangeLog::new();
        log.start_session("s1");
        log_fov(&mut log, 70, 80);
        log.save(&mut store).unwrap();

        let loaded = ChangeLog::load(&store).unwrap();
        assert_eq!(loaded.entries(), log.entries());
        assert_eq!(loaded.current_session(), Some("s1"));
        assert!(ChangeLog::load(&InMemoryKv::new()).unwrap().is_empty());
    }
}
