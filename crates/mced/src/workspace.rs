//! Workspace: the stores of one instance, loaded from and saved to its state file.

use anyhow::{Context, Result};
use mced_core::{Backup, BackupStore, ChangeLog, ChangeTracker};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::native_fs::NativeFs;
use crate::persistence::StateFile;

pub struct Workspace {
    instance_path: PathBuf,
    state: StateFile,
    backups: BackupStore<NativeFs>,
    tracker: ChangeTracker,
    changelog: ChangeLog,
}

impl Workspace {
    /// Open an instance: create the backup directory and load persisted state.
    pub async fn open(config: &Config) -> Result<Self> {
        let state = StateFile::new(&config.instance_path).context("Failed to open state file")?;

        let fs = NativeFs::new(config.instance_path.clone());
        let mut backups = BackupStore::with_config(fs, config.backup.clone());
        backups.initialize("").await;
        let loaded = backups.load_catalog(&state).await?;
        debug!("Loaded {} backup(s) from catalog", loaded);

        let tracker = ChangeTracker::load(&state).context("Failed to load tracked changes")?;
        let changelog = ChangeLog::load(&state).context("Failed to load changelog")?;

        Ok(Self {
            instance_path: config.instance_path.clone(),
            state,
            backups,
            tracker,
            changelog,
        })
    }

    /// Turn a user-supplied path into one relative to the instance root.
    pub fn relative_path(&self, path: &str) -> String {
        let as_path = Path::new(path);
        let relative = as_path.strip_prefix(&self.instance_path).unwrap_or(as_path);
        relative
            .to_string_lossy()
            .replace('\\', "/")
            .trim_start_matches("./")
            .to_string()
    }

    pub async fn create_backup(&mut self, file: &str, mod_name: &str) -> Result<Backup> {
        let path = self.relative_path(file);
        let id = self
            .backups
            .create_backup(&path, mod_name)
            .await
            .with_context(|| format!("Failed to back up {}", path))?;
        self.save_catalog()?;

        self.backups
            .get(&id)
            .cloned()
            .context("Backup evicted immediately; is retention set to zero?")
    }

    pub fn list_backups(&self, file: Option<&str>) -> Vec<Backup> {
        let path = file.map(|f| self.relative_path(f));
        self.backups.list_backups(path.as_deref())
    }

    /// Overwrite the config file from a backup. The catalog is left as is.
    pub async fn restore_backup(&self, backup_id: &str) -> Result<Backup> {
        self.backups.restore_backup(backup_id).await?;
        self.backups
            .get(backup_id)
            .cloned()
            .with_context(|| format!("Backup {} disappeared during restore", backup_id))
    }

    pub async fn delete_backup(&mut self, backup_id: &str) -> Result<()> {
        self.backups.delete_backup(backup_id).await?;
        self.save_catalog()
    }

    /// Remove every backup. Failures are logged by the store, not returned.
    pub async fn cleanup_backups(&mut self) -> Result<usize> {
        let before = self.backups.list_backups(None).len();
        self.backups.cleanup_all_backups().await;
        self.save_catalog()?;
        Ok(before - self.backups.list_backups(None).len())
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Forget a tracked setting and return its original value.
    pub fn reset_change(&mut self, mod_id: &str, setting_key: &str) -> Result<Option<Value>> {
        let original = self.tracker.reset_to_default(mod_id, setting_key);
        if original.is_some() {
            self.tracker.save(&mut self.state)?;
        }
        Ok(original)
    }

    pub fn clear_changes(&mut self) -> Result<usize> {
        let cleared = self.tracker.len();
        self.tracker.clear_changes();
        self.tracker.save(&mut self.state)?;
        Ok(cleared)
    }

    pub fn changelog(&self) -> &ChangeLog {
        &self.changelog
    }

    pub fn clear_changelog(&mut self) -> Result<usize> {
        let cleared = self.changelog.len();
        self.changelog.clear();
        self.changelog.save(&mut self.state)?;
        info!("Cleared {} changelog entries", cleared);
        Ok(cleared)
    }

    fn save_catalog(&mut self) -> Result<()> {
        self.backups
            .save_catalog(&mut self.state)
            .context("Failed to save backup catalog")
    }
}
