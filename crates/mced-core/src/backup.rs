//! BackupStore: pre-save copies of config files with per-file retention.
//!
//! Backups live in a hidden directory under the instance root:
//! `<root>/.mced-backups/<owner>_<epochMillis>_<fileName>`. The directory holds
//! no index. The catalog is kept in memory and can be persisted through a
//! [`KeyValueStore`] with [`BackupStore::save_catalog`] and
//! [`BackupStore::load_catalog`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fs::{self, FileSystem, FsError, file_name, join_path};
use crate::kv::{self, KeyValueStore, PersistError};

/// Name of the backup directory created under the instance root.
pub const BACKUP_DIR_NAME: &str = ".mced-backups";
/// Backups kept per original file.
pub const MAX_BACKUPS_PER_FILE: usize = 5;
/// Key the catalog is persisted under.
pub const CATALOG_KEY: &str = "mced-backups";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Backup {0} not found")]
    NotFound(String),

    #[error("Backup store not initialized")]
    NotInitialized,

    #[error("Catalog error: {0}")]
    Persist(#[from] PersistError),
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// Metadata for one backup copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    /// `<owner>_<epochMillis>`
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// File the backup was taken from
    pub config_path: String,
    /// Where the copy lives
    pub backup_path: String,
    /// Mod that owns the config file
    pub mod_name: String,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Directory created under the instance root
    pub dir_name: String,
    /// Backups kept per original file, oldest evicted first
    pub max_per_file: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir_name: BACKUP_DIR_NAME.to_string(),
            max_per_file: MAX_BACKUPS_PER_FILE,
        }
    }
}

/// Timestamped copies of files taken before they are overwritten.
pub struct BackupStore<F: FileSystem> {
    fs: F,
    config: BackupConfig,
    backup_dir: Option<String>,
    /// Original path -> backups, oldest first
    backups: BTreeMap<String, Vec<Backup>>,
    /// Last creation time handed out, so ids stay unique within a millisecond
    last_millis: i64,
}

impl<F: FileSystem> BackupStore<F> {
    pub fn new(fs: F) -> Self {
        Self::with_config(fs, BackupConfig::default())
    }

    pub fn with_config(fs: F, config: BackupConfig) -> Self {
        Self {
            fs,
            config,
            backup_dir: None,
            backups: BTreeMap::new(),
            last_millis: 0,
        }
    }

    /// Point the store at `root` and make sure the backup directory exists.
    ///
    /// Failing to create the directory only logs: backups are best-effort and
    /// must never block editing. `create_backup` reports the failure later.
    pub async fn initialize(&mut self, root: &str) {
        let dir = join_path(root, &self.config.dir_name);
        if let Err(e) = self.fs.mkdir(&dir).await {
            warn!("Failed to create backup directory {}: {}", dir, e);
        }
        debug!("Backup directory: {}", dir);
        self.backup_dir = Some(dir);
    }

    pub fn backup_dir(&self) -> Option<&str> {
        self.backup_dir.as_deref()
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Copy `config_path` into the backup directory and return the new backup's id.
    ///
    /// Read and write failures propagate: callers about to overwrite the file
    /// need to know whether the copy exists.
    pub async fn create_backup(&mut self, config_path: &str, mod_name: &str) -> Result<String> {
        let backup_dir = self.backup_dir.clone().ok_or(BackupError::NotInitialized)?;

        let created_at = self.next_timestamp();
        let id = format!("{}_{}", mod_name, created_at.timestamp_millis());
        let backup_name = format!(
            "{}_{}_{}",
            sanitize(mod_name),
            created_at.timestamp_millis(),
            file_name(config_path)
        );
        let backup_path = join_path(&backup_dir, &backup_name);

        let content = self.fs.read(config_path).await?;
        self.fs.write(&backup_path, &content).await?;

        info!("Backed up {} to {}", config_path, backup_path);
        self.insert(Backup {
            id: id.clone(),
            created_at,
            config_path: config_path.to_string(),
            backup_path,
            mod_name: mod_name.to_string(),
        });

        self.enforce_retention(config_path).await;
        Ok(id)
    }

    /// Overwrite the original file with the content captured in `backup_id`.
    pub async fn restore_backup(&self, backup_id: &str) -> Result<()> {
        let backup = self
            .get(backup_id)
            .ok_or_else(|| BackupError::NotFound(backup_id.to_string()))?;

        let content = self.fs.read(&backup.backup_path).await?;
        self.fs.write(&backup.config_path, &content).await?;

        info!("Restored {} from backup {}", backup.config_path, backup_id);
        Ok(())
    }

    /// Backups of one file, or of every file when `config_path` is `None`. Newest first.
    pub fn list_backups(&self, config_path: Option<&str>) -> Vec<Backup> {
        let mut backups: Vec<Backup> = match config_path {
            Some(path) => self.backups.get(path).cloned().unwrap_or_default(),
            None => self.backups.values().flatten().cloned().collect(),
        };
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        backups
    }

    pub fn get(&self, backup_id: &str) -> Option<&Backup> {
        self.backups
            .values()
            .flatten()
            .find(|backup| backup.id == backup_id)
    }

    /// Remove a backup's file and its catalog entry.
    ///
    /// A file that is already gone still has its entry removed. Any other
    /// delete failure leaves the entry in place and is returned.
    pub async fn delete_backup(&mut self, backup_id: &str) -> Result<()> {
        let backup = self
            .get(backup_id)
            .cloned()
            .ok_or_else(|| BackupError::NotFound(backup_id.to_string()))?;

        match self.fs.delete(&backup.backup_path).await {
            Ok(()) => {}
            Err(FsError::NotFound(_)) => {
                debug!("Backup file {} already missing", backup.backup_path);
            }
            Err(e) => return Err(e.into()),
        }

        self.remove_entries(&backup.config_path, &[backup.id]);
        info!("Deleted backup {}", backup_id);
        Ok(())
    }

    /// Remove the whole backup directory and forget every backup.
    ///
    /// Best-effort: failures are logged, never returned. Entries whose files
    /// survive a failed removal stay in the catalog.
    pub async fn cleanup_all_backups(&mut self) {
        let Some(dir) = self.backup_dir.clone() else {
            self.backups.clear();
            return;
        };

        match remove_tree(&self.fs, &dir).await {
            Ok(()) | Err(FsError::NotFound(_)) => {
                info!("Removed backup directory {}", dir);
                self.backups.clear();
            }
            Err(e) => {
                warn!("Failed to remove backup directory {}: {}", dir, e);
                let mut surviving = BTreeMap::new();
                for (path, entries) in std::mem::take(&mut self.backups) {
                    let mut kept = Vec::new();
                    for backup in entries {
                        if self.fs.exists(&backup.backup_path).await.unwrap_or(false) {
                            kept.push(backup);
                        }
                    }
                    if !kept.is_empty() {
                        surviving.insert(path, kept);
                    }
                }
                self.backups = surviving;
            }
        }
    }

    /// Every known backup, oldest first.
    pub fn catalog(&self) -> Vec<Backup> {
        let mut backups: Vec<Backup> = self.backups.values().flatten().cloned().collect();
        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        backups
    }

    /// Persist the catalog under [`CATALOG_KEY`].
    pub fn save_catalog(&self, store: &mut dyn KeyValueStore) -> kv::Result<()> {
        let persisted = PersistedCatalog {
            backups: self.catalog(),
        };
        store.set(CATALOG_KEY, serde_json::to_string(&persisted)?)
    }

    /// Merge a catalog saved by [`save_catalog`](Self::save_catalog).
    ///
    /// Entries whose backup file no longer exists are dropped, and retention
    /// is applied to every file that gained entries. Returns the number of
    /// entries added, counted before retention.
    pub async fn load_catalog(&mut self, store: &dyn KeyValueStore) -> Result<usize> {
        let Some(raw) = store.get(CATALOG_KEY)? else {
            return Ok(0);
        };
        let persisted: PersistedCatalog =
            serde_json::from_str(&raw).map_err(PersistError::from)?;

        let mut loaded = 0;
        let mut touched = BTreeSet::new();
        for backup in persisted.backups {
            if self.get(&backup.id).is_some() {
                continue;
            }
            if !self.fs.exists(&backup.backup_path).await? {
                debug!("Dropping catalog entry {}: file is gone", backup.id);
                continue;
            }
            self.last_millis = self.last_millis.max(backup.created_at.timestamp_millis());
            touched.insert(backup.config_path.clone());
            self.insert(backup);
            loaded += 1;
        }

        // The catalog may predate a lower retention limit
        for config_path in touched {
            self.enforce_retention(&config_path).await;
        }
        Ok(loaded)
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let millis = now.timestamp_millis().max(self.last_millis + 1);
        self.last_millis = millis;
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(now)
    }

    fn insert(&mut self, backup: Backup) {
        let entries = self.backups.entry(backup.config_path.clone()).or_default();
        entries.push(backup);
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    fn remove_entries(&mut self, config_path: &str, ids: &[String]) {
        if let Some(entries) = self.backups.get_mut(config_path) {
            entries.retain(|backup| !ids.contains(&backup.id));
            if entries.is_empty() {
                self.backups.remove(config_path);
            }
        }
    }

    /// Evict the oldest backups of `config_path` beyond the retention limit.
    ///
    /// An entry is only dropped once its file is gone, so a failed delete keeps
    /// the file tracked and eviction is retried on the next backup.
    async fn enforce_retention(&mut self, config_path: &str) {
        let keep = self.config.max_per_file.max(1);
        let excess: Vec<Backup> = match self.backups.get(config_path) {
            Some(entries) if entries.len() > keep => entries[..entries.len() - keep].to_vec(),
            _ => return,
        };

        let mut evicted = Vec::new();
        for backup in excess {
            match self.fs.delete(&backup.backup_path).await {
                Ok(()) | Err(FsError::NotFound(_)) => {
                    debug!("Evicted backup {}", backup.id);
                    evicted.push(backup.id);
                }
                Err(e) => {
                    warn!("Failed to evict backup {}: {}", backup.backup_path, e);
                }
            }
        }
        self.remove_entries(config_path, &evicted);
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCatalog {
    backups: Vec<Backup>,
}

/// Keep owner names from introducing path separators into backup file names.
fn sanitize(name: &str) -> String {
    name.replace(['/', '\\'], "-")
}

fn remove_tree<'a, F: FileSystem>(
    fs: &'a F,
    path: &'a str,
) -> Pin<Box<dyn Future<Output = fs::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        for entry in fs.list(path).await? {
            let child = join_path(path, &entry.name);
            if entry.is_dir {
                remove_tree(fs, &child).await?;
            } else {
                fs.delete(&child).await?;
            }
        }
        fs.delete(path).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use crate::kv::InMemoryKv;
    use std::sync::Arc;

    const CONFIG: &str = "config/create-client.toml";

    async fn store_with_config() -> (Arc<InMemoryFs>, BackupStore<Arc<InMemoryFs>>) {
        let fs = Arc::new(InMemoryFs::new());
        fs.write(CONFIG, b"renderDistance = 12\n").await.unwrap();
        let mut store = BackupStore::new(Arc::clone(&fs));
        store.initialize("").await;
        (fs, store)
    }

    #[tokio::test]
    async fn test_initialize_creates_directory() {
        let (fs, store) = store_with_config().await;
        assert_eq!(store.backup_dir(), Some(".mced-backups"));
        assert!(fs.exists(".mced-backups").await.unwrap());
    }

    #[tokio::test]
    async fn test_initialize_swallows_mkdir_failure() {
        let fs = Arc::new(InMemoryFs::new());
        fs.deny_writes("instance");
        let mut store = BackupStore::new(Arc::clone(&fs));

        store.initialize("instance").await;
        assert_eq!(store.backup_dir(), Some("instance/.mced-backups"));
        assert!(!fs.exists("instance/.mced-backups").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_backup_copies_content() {
        let (fs, mut store) = store_with_config().await;

        let id = store.create_backup(CONFIG, "Create").await.unwrap();
        assert!(id.starts_with("Create_"));

        let backup = store.get(&id).unwrap().clone();
        assert_eq!(backup.config_path, CONFIG);
        assert_eq!(backup.mod_name, "Create");
        assert!(backup.backup_path.starts_with(".mced-backups/Create_"));
        assert!(backup.backup_path.ends_with("_create-client.toml"));
        assert_eq!(
            fs.read(&backup.backup_path).await.unwrap(),
            b"renderDistance = 12\n"
        );
    }

    #[tokio::test]
    async fn test_create_backup_requires_initialize() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write(CONFIG, b"x").await.unwrap();
        let mut store = BackupStore::new(fs);

        assert!(matches!(
            store.create_backup(CONFIG, "Create").await,
            Err(BackupError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_create_backup_propagates_failures() {
        let (fs, mut store) = store_with_config().await;

        assert!(matches!(
            store.create_backup("config/missing.toml", "Create").await,
            Err(BackupError::Fs(FsError::NotFound(_)))
        ));

        fs.deny_writes(".mced-backups");
        assert!(matches!(
            store.create_backup(CONFIG, "Create").await,
            Err(BackupError::Fs(FsError::Io(_)))
        ));
        assert!(store.list_backups(None).is_empty());
    }

    #[tokio::test]
    async fn test_ids_unique_within_same_millisecond() {
        let (_fs, mut store) = store_with_config().await;

        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(store.create_backup(CONFIG, "Create").await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn test_retention_keeps_five_most_recent() {
        let (fs, mut store) = store_with_config().await;

        let mut ids = Vec::new();
        for i in 0..8 {
            fs.write(CONFIG, format!("version = {}\n", i).as_bytes())
                .await
                .unwrap();
            ids.push(store.create_backup(CONFIG, "Create").await.unwrap());
        }
        let paths: Vec<String> = ids
            .iter()
            .map(|id| format!(".mced-backups/{}_create-client.toml", id))
            .collect();

        let listed = store.list_backups(Some(CONFIG));
        assert_eq!(listed.len(), 5);
        let listed_ids: Vec<&str> = listed.iter().map(|b| b.id.as_str()).collect();
        let newest: Vec<&str> = ids[3..].iter().rev().map(String::as_str).collect();
        assert_eq!(listed_ids, newest);

        for evicted in &paths[..3] {
            assert!(!fs.exists(evicted).await.unwrap());
        }
        for kept in &paths[3..] {
            assert!(fs.exists(kept).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_retention_is_per_file() {
        let (fs, mut store) = store_with_config().await;
        fs.write("config/jei-client.toml", b"a").await.unwrap();

        for _ in 0..6 {
            store.create_backup(CONFIG, "Create").await.unwrap();
        }
        store.create_backup("config/jei-client.toml", "JEI").await.unwrap();

        assert_eq!(store.list_backups(Some(CONFIG)).len(), 5);
        assert_eq!(store.list_backups(Some("config/jei-client.toml")).len(), 1);
        assert_eq!(store.list_backups(None).len(), 6);
    }

    #[tokio::test]
    async fn test_failed_eviction_keeps_entry() {
        let config = BackupConfig {
            max_per_file: 1,
            ..BackupConfig::default()
        };
        let fs = Arc::new(InMemoryFs::new());
        fs.write(CONFIG, b"a").await.unwrap();
        let mut store = BackupStore::with_config(Arc::clone(&fs), config);
        store.initialize("").await;

        let first = store.create_backup(CONFIG, "Create").await.unwrap();
        let first_path = store.get(&first).unwrap().backup_path.clone();

        // Allow the new copy but not deletion of the old one
        fs.deny_writes(&first_path);
        store.create_backup(CONFIG, "Create").await.unwrap();
        assert_eq!(store.list_backups(Some(CONFIG)).len(), 2);
        assert!(store.get(&first).is_some());

        fs.allow_writes();
        store.create_backup(CONFIG, "Create").await.unwrap();
        assert_eq!(store.list_backups(Some(CONFIG)).len(), 1);
        assert!(!fs.exists(&first_path).await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let (fs, mut store) = store_with_config().await;

        let id = store.create_backup(CONFIG, "Create").await.unwrap();
        fs.write(CONFIG, b"renderDistance = 32\n").await.unwrap();

        store.restore_backup(&id).await.unwrap();
        assert_eq!(fs.read(CONFIG).await.unwrap(), b"renderDistance = 12\n");
    }

    #[tokio::test]
    async fn test_restore_unknown_id() {
        let (_fs, store) = store_with_config().await;
        assert!(matches!(
            store.restore_backup("Create_0").await,
            Err(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_propagates_write_failure() {
        let (fs, mut store) = store_with_config().await;
        let id = store.create_backup(CONFIG, "Create").await.unwrap();

        fs.deny_writes("config");
        assert!(matches!(
            store.restore_backup(&id).await,
            Err(BackupError::Fs(_))
        ));
    }

    #[tokio::test]
    async fn test_list_all_newest_first() {
        let (fs, mut store) = store_with_config().await;
        fs.write("config/jei-client.toml", b"a").await.unwrap();

        let a = store.create_backup(CONFIG, "Create").await.unwrap();
        let b = store.create_backup("config/jei-client.toml", "JEI").await.unwrap();
        let c = store.create_backup(CONFIG, "Create").await.unwrap();

        let ids: Vec<String> = store.list_backups(None).into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![c, b, a]);
        assert!(store.list_backups(Some("config/unknown.toml")).is_empty());
    }

    #[tokio::test]
    async fn test_delete_backup() {
        let (fs, mut store) = store_with_config().await;
        let id = store.create_backup(CONFIG, "Create").await.unwrap();
        let path = store.get(&id).unwrap().backup_path.clone();

        store.delete_backup(&id).await.unwrap();
        assert!(store.get(&id).is_none());
        assert!(!fs.exists(&path).await.unwrap());
        assert!(store.list_backups(Some(CONFIG)).is_empty());

        assert!(matches!(
            store.delete_backup(&id).await,
            Err(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_backup_with_missing_file() {
        let (fs, mut store) = store_with_config().await;
        let id = store.create_backup(CONFIG, "Create").await.unwrap();
        let path = store.get(&id).unwrap().backup_path.clone();
        fs.delete(&path).await.unwrap();

        store.delete_backup(&id).await.unwrap();
        assert!(store.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_entry() {
        let (fs, mut store) = store_with_config().await;
        let id = store.create_backup(CONFIG, "Create").await.unwrap();

        fs.deny_writes(".mced-backups");
        assert!(matches!(
            store.delete_backup(&id).await,
            Err(BackupError::Fs(_))
        ));
        assert!(store.get(&id).is_some());
    }

    #[tokio::test]
    async fn test_cleanup_all_backups() {
        let (fs, mut store) = store_with_config().await;
        fs.write(".mced-backups/stray/notes.txt", b"x").await.unwrap();
        store.create_backup(CONFIG, "Create").await.unwrap();
        store.create_backup(CONFIG, "Create").await.unwrap();

        store.cleanup_all_backups().await;
        assert!(!fs.exists(".mced-backups").await.unwrap());
        assert!(store.list_backups(None).is_empty());

        // Cleaning an already-removed directory is fine
        store.cleanup_all_backups().await;
        // The original is untouched
        assert!(fs.exists(CONFIG).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_swallowed() {
        let (fs, mut store) = store_with_config().await;
        let id = store.create_backup(CONFIG, "Create").await.unwrap();

        fs.deny_writes(".mced-backups");
        store.cleanup_all_backups().await;
        // The file survived, so its entry does too
        assert!(store.get(&id).is_some());
    }

    #[tokio::test]
    async fn test_owner_with_separator() {
        let (fs, mut store) = store_with_config().await;
        let id = store.create_backup(CONFIG, "AE2/Addons").await.unwrap();
        let backup = store.get(&id).unwrap();

        assert!(backup.backup_path.starts_with(".mced-backups/AE2-Addons_"));
        assert!(fs.exists(&backup.backup_path).await.unwrap());
    }

    #[tokio::test]
    async fn test_catalog_survives_new_store() {
        let (fs, mut store) = store_with_config().await;
        let mut kv = InMemoryKv::new();
        let kept = store.create_backup(CONFIG, "Create").await.unwrap();
        let gone = store.create_backup(CONFIG, "Create").await.unwrap();
        let gone_path = store.get(&gone).unwrap().backup_path.clone();
        store.save_catalog(&mut kv).unwrap();
        fs.delete(&gone_path).await.unwrap();

        // A fresh store knows nothing until the catalog is loaded
        let mut reopened = BackupStore::new(Arc::clone(&fs));
        reopened.initialize("").await;
        assert!(reopened.list_backups(None).is_empty());

        assert_eq!(reopened.load_catalog(&kv).await.unwrap(), 1);
        assert!(reopened.get(&kept).is_some());
        assert!(reopened.get(&gone).is_none());

        // New ids never reuse a loaded timestamp
        let next = reopened.create_backup(CONFIG, "Create").await.unwrap();
        assert_ne!(next, kept);
        reopened.restore_backup(&kept).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_catalog_applies_lower_retention() {
        let (fs, mut store) = store_with_config().await;
        let mut kv = InMemoryKv::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(store.create_backup(CONFIG, "Create").await.unwrap());
        }
        store.save_catalog(&mut kv).unwrap();

        let config = BackupConfig {
            max_per_file: 2,
            ..BackupConfig::default()
        };
        let mut reopened = BackupStore::with_config(Arc::clone(&fs), config);
        reopened.initialize("").await;
        assert_eq!(reopened.load_catalog(&kv).await.unwrap(), 5);

        let listed: Vec<String> = reopened
            .list_backups(Some(CONFIG))
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(listed, vec![ids[4].clone(), ids[3].clone()]);

        for id in &ids[..3] {
            let path = format!(".mced-backups/{}_create-client.toml", id);
            assert!(!fs.exists(&path).await.unwrap());
        }
    }
}
