//! EditSession: one mod's config files open for editing.
//!
//! Each committed edit records the change, logs it, and pushes a history
//! snapshot. Saving a file takes a backup first when configured to.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::backup::{BackupError, BackupStore};
use crate::changelog::ChangeLog;
use crate::changes::{values_equal, ChangeTracker};
use crate::document::ConfigFile;
use crate::events::{EditorEvent, EventBus, HistoryDirection};
use crate::fs::{FileSystem, FsError};
use crate::history::{HistoryStack, MAX_HISTORY};
use crate::kv::{self, KeyValueStore};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Copy a file into the backup store before overwriting it
    pub backup_before_save: bool,
    /// Undo steps kept
    pub history_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backup_before_save: true,
            history_depth: MAX_HISTORY,
        }
    }
}

pub struct EditSession<F: FileSystem> {
    mod_id: String,
    mod_name: String,
    config: SessionConfig,
    documents: Vec<ConfigFile>,
    /// Documents as last loaded or saved, per file
    saved: Vec<ConfigFile>,
    tracker: ChangeTracker,
    history: HistoryStack<Vec<ConfigFile>>,
    changelog: ChangeLog,
    backups: BackupStore<F>,
    events: Arc<EventBus>,
}

/// Settings are tracked per file so equally named keys in a mod's
/// client and server configs stay apart.
fn tracking_key(file: &ConfigFile, key: &str) -> String {
    format!("{}/{}", file.name, key)
}

impl<F: FileSystem> EditSession<F> {
    pub fn new(
        mod_id: impl Into<String>,
        mod_name: impl Into<String>,
        backups: BackupStore<F>,
        config: SessionConfig,
    ) -> Self {
        let mut changelog = ChangeLog::new();
        changelog.start_session(Uuid::new_v4().to_string());
        Self {
            mod_id: mod_id.into(),
            mod_name: mod_name.into(),
            history: HistoryStack::with_capacity(Vec::new(), config.history_depth),
            config,
            documents: Vec::new(),
            saved: Vec::new(),
            tracker: ChangeTracker::new(),
            changelog,
            backups,
            events: Arc::new(EventBus::new()),
        }
    }

    /// Continue from a previously persisted tracker.
    pub fn with_tracker(mut self, tracker: ChangeTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Continue a previously persisted changelog, under this session's id.
    pub fn with_changelog(mut self, mut changelog: ChangeLog) -> Self {
        if let Some(id) = self.changelog.current_session() {
            changelog.start_session(id.to_string());
        }
        self.changelog = changelog;
        self
    }

    /// Start editing `documents`, discarding any undo history.
    pub fn open(&mut self, documents: Vec<ConfigFile>) {
        self.history.init(documents.clone());
        self.saved = documents.clone();
        self.events.emit(EditorEvent::Loaded {
            files: documents.len(),
        });
        self.documents = documents;
    }

    /// Change one setting. Returns `false` (and records nothing) when the file
    /// or setting is unknown or the value is unchanged.
    pub fn set_value(&mut self, config_path: &str, setting_key: &str, value: Value) -> bool {
        let Some(file) = self.documents.iter_mut().find(|f| f.path == config_path) else {
            return false;
        };
        let tracked_as = tracking_key(file, setting_key);
        let file_name = file.name.clone();
        let Some(setting) = file.setting_mut(setting_key) else {
            return false;
        };
        if values_equal(&setting.value, &value) {
            return false;
        }
        let old_value = std::mem::replace(&mut setting.value, value.clone());

        self.tracker
            .track(&self.mod_id, &tracked_as, old_value.clone(), value.clone());
        self.changelog.log_change(
            &self.mod_id,
            &self.mod_name,
            setting_key,
            &file_name,
            old_value,
            value,
        );
        self.commit(config_path, setting_key);
        true
    }

    /// Put a tracked setting back to its baseline. Returns the restored value,
    /// or `None` when the setting was never changed.
    pub fn reset_to_default(&mut self, config_path: &str, setting_key: &str) -> Option<Value> {
        let file = self.documents.iter_mut().find(|f| f.path == config_path)?;
        file.setting(setting_key)?;
        let tracked_as = tracking_key(file, setting_key);
        let original = self.tracker.reset_to_default(&self.mod_id, &tracked_as)?;

        let file_name = file.name.clone();
        let setting = file.setting_mut(setting_key)?;
        let old_value = std::mem::replace(&mut setting.value, original.clone());
        if !values_equal(&old_value, &original) {
            self.changelog.log_change(
                &self.mod_id,
                &self.mod_name,
                setting_key,
                &file_name,
                old_value,
                original.clone(),
            );
            self.commit(config_path, setting_key);
        }
        Some(original)
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(documents) => {
                self.apply_history(documents, HistoryDirection::Undo);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(documents) => {
                self.apply_history(documents, HistoryDirection::Redo);
                true
            }
            None => false,
        }
    }

    /// Write `content` (the rendered form of the document) to `config_path`.
    ///
    /// With `backup_before_save`, an existing file is backed up first and a
    /// failed backup aborts the save. Returns the backup id, if one was taken.
    pub async fn save(&mut self, config_path: &str, content: &[u8]) -> Result<Option<String>> {
        let mut backup_id = None;
        if self.config.backup_before_save && self.backups.fs().exists(config_path).await? {
            let id = self
                .backups
                .create_backup(config_path, &self.mod_name)
                .await?;
            self.events.emit(EditorEvent::BackupCreated {
                id: id.clone(),
                path: config_path.to_string(),
            });
            backup_id = Some(id);
        }

        self.backups.fs().write(config_path, content).await?;
        debug!("Saved {} ({} bytes)", config_path, content.len());

        if let Some(current) = self.documents.iter().find(|f| f.path == config_path) {
            match self.saved.iter_mut().find(|f| f.path == config_path) {
                Some(saved) => *saved = current.clone(),
                None => self.saved.push(current.clone()),
            }
        }
        self.events.emit(EditorEvent::Saved {
            path: config_path.to_string(),
        });
        Ok(backup_id)
    }

    /// Overwrite a file from a backup. Re-parsing the file into the
    /// session's documents is up to the caller.
    pub async fn restore(&mut self, backup_id: &str) -> Result<()> {
        self.backups.restore_backup(backup_id).await?;
        self.events.emit(EditorEvent::BackupRestored {
            id: backup_id.to_string(),
        });
        Ok(())
    }

    /// Paths whose documents differ from what was last loaded or saved.
    pub fn unsaved_paths(&self) -> Vec<&str> {
        self.documents
            .iter()
            .filter(|doc| !self.saved.iter().any(|saved| saved == *doc))
            .map(|doc| doc.path.as_str())
            .collect()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.unsaved_paths().is_empty()
    }

    /// Save the tracker and changelog so a later session or the `mced`
    /// command line can pick them up.
    pub fn persist(&self, store: &mut dyn KeyValueStore) -> kv::Result<()> {
        self.tracker.save(store)?;
        self.changelog.save(store)?;
        debug!("Persisted {} tracked setting(s) for {}", self.tracker.len(), self.mod_id);
        Ok(())
    }

    pub fn documents(&self) -> &[ConfigFile] {
        &self.documents
    }

    pub fn document(&self, config_path: &str) -> Option<&ConfigFile> {
        self.documents.iter().find(|f| f.path == config_path)
    }

    pub fn mod_id(&self) -> &str {
        &self.mod_id
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Whether a setting differs from its baseline.
    pub fn is_modified(&self, config_path: &str, setting_key: &str) -> bool {
        self.document(config_path).is_some_and(|file| {
            self.tracker
                .is_modified(&self.mod_id, &tracking_key(file, setting_key))
        })
    }

    pub fn changelog(&self) -> &ChangeLog {
        &self.changelog
    }

    pub fn history(&self) -> &HistoryStack<Vec<ConfigFile>> {
        &self.history
    }

    pub fn backups(&self) -> &BackupStore<F> {
        &self.backups
    }

    pub fn backups_mut(&mut self) -> &mut BackupStore<F> {
        &mut self.backups
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    fn commit(&mut self, config_path: &str, setting_key: &str) {
        self.history.push_state(self.documents.clone());
        self.events.emit(EditorEvent::ValueChanged {
            path: config_path.to_string(),
            key: setting_key.to_string(),
        });
    }

    /// Swap in documents from history and record every value that moved.
    fn apply_history(&mut self, documents: Vec<ConfigFile>, direction: HistoryDirection) {
        let previous = std::mem::replace(&mut self.documents, documents);

        for file in &self.documents {
            let Some(before) = previous.iter().find(|f| f.path == file.path) else {
                continue;
            };
            for setting in &file.settings {
                let Some(old) = before.setting(&setting.key) else {
                    continue;
                };
                if !values_equal(&old.value, &setting.value) {
                    self.tracker.track(
                        &self.mod_id,
                        &tracking_key(file, &setting.key),
                        old.value.clone(),
                        setting.value.clone(),
                    );
                }
            }
        }

        debug!("Applied {:?} for {}", direction, self.mod_id);
        self.events.emit(EditorEvent::HistoryApplied { direction });
    }
}
