//! mced-core: editing state for Minecraft mod config files.
//!
//! This crate provides:
//! - `ChangeTracker` - what changed since load, per mod and setting
//! - `HistoryStack` - bounded undo/redo over whole document sets
//! - `BackupStore` - pre-save file copies with per-file retention
//! - `ChangeLog` - audit log of edits grouped by session
//! - `EditSession` - the above composed for one mod's config files
//! - FileSystem and KeyValueStore trait abstractions

pub mod backup;
pub mod changelog;
pub mod changes;
pub mod document;
pub mod events;
pub mod fs;
pub mod history;
pub mod kv;
pub mod session;

pub use backup::{Backup, BackupConfig, BackupError, BackupStore};
pub use changelog::{ChangeLog, ChangeLogEntry};
pub use changes::{values_equal, ChangeKey, ChangeRecord, ChangeTracker};
pub use document::{ConfigFile, ConfigFormat, ConfigSetting};
pub use events::{EditorEvent, EventBus, HistoryDirection, Subscription};
pub use fs::{FileEntry, FileSystem, FsError, InMemoryFs};
pub use history::HistoryStack;
pub use kv::{InMemoryKv, KeyValueStore, PersistError};
pub use session::{EditSession, SessionConfig, SessionError};
