//! FileSystem trait abstraction for the file operations the stores depend on.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in the `mced` binary crate) - Uses tokio::fs
//!
//! Paths are `/`-separated strings relative to the implementation's root.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Directory entry
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Platform-independent filesystem abstraction.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents (creates parent directories if needed)
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Delete file or empty directory
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create directory (and parents if needed)
    async fn mkdir(&self, path: &str) -> Result<()>;
}

/// Join two relative paths with `/`, treating an empty base as the root.
pub fn join_path(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base, name)
    }
}

/// Last component of a path.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// In-memory filesystem for testing
pub struct InMemoryFs {
    files: RwLock<HashMap<String, Vec<u8>>>,
    dirs: RwLock<HashSet<String>>,
    /// Path prefixes where every mutation fails with `FsError::Io`
    denied: RwLock<Vec<String>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        let mut dirs = HashSet::new();
        dirs.insert(String::new()); // Root directory
        Self {
            files: RwLock::new(HashMap::new()),
            dirs: RwLock::new(dirs),
            denied: RwLock::new(Vec::new()),
        }
    }

    /// Make writes, deletes and mkdirs under `prefix` fail, for exercising error paths.
    pub fn deny_writes(&self, prefix: &str) {
        let prefix = Self::normalize_path(prefix);
        self.denied.write().unwrap().push(prefix);
    }

    /// Lift every restriction set by `deny_writes`.
    pub fn allow_writes(&self) {
        self.denied.write().unwrap().clear();
    }

    fn check_writable(&self, path: &str) -> Result<()> {
        let denied = self.denied.read().unwrap();
        if denied
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{}/", prefix)))
        {
            return Err(FsError::Io(format!("permission denied: {}", path)));
        }
        Ok(())
    }

    fn normalize_path(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn parent_path(path: &str) -> Option<String> {
        let normalized = Self::normalize_path(path);
        if normalized.is_empty() {
            None
        } else {
            match normalized.rfind('/') {
                Some(pos) => Some(normalized[..pos].to_string()),
                None => Some(String::new()),
            }
        }
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        if let Some(content) = files.get(&path) {
            return Ok(content.clone());
        }
        if self.dirs.read().unwrap().contains(&path) {
            return Err(FsError::IsDirectory(path));
        }
        Err(FsError::NotFound(path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);
        self.check_writable(&path)?;

        if self.dirs.read().unwrap().contains(&path) {
            return Err(FsError::IsDirectory(path));
        }

        // Create parent directories
        if let Some(parent) = Self::parent_path(&path) {
            self.mkdir(&parent).await?;
        }

        let mut files = self.files.write().unwrap();
        files.insert(path, content.to_vec());
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = Self::normalize_path(path);
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        let dirs = self.dirs.read().unwrap();
        if !dirs.contains(&path) {
            return Err(FsError::NotFound(path));
        }

        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        let files = self.files.read().unwrap();
        for file_path in files.keys() {
            if let Some(rest) = file_path.strip_prefix(&prefix) {
                if !rest.contains('/') && seen.insert(rest.to_string()) {
                    entries.push(FileEntry {
                        name: rest.to_string(),
                        is_dir: false,
                    });
                }
            }
        }

        for dir_path in dirs.iter() {
            if let Some(rest) = dir_path.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') && seen.insert(rest.to_string()) {
                    entries.push(FileEntry {
                        name: rest.to_string(),
                        is_dir: true,
                    });
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        self.check_writable(&path)?;

        // Try to delete as file first
        {
            let mut files = self.files.write().unwrap();
            if files.remove(&path).is_some() {
                return Ok(());
            }
        }

        // Directories must be empty
        let prefix = format!("{}/", path);
        let has_children = self.files.read().unwrap().keys().any(|f| f.starts_with(&prefix))
            || self.dirs.read().unwrap().iter().any(|d| d.starts_with(&prefix));
        if has_children {
            return Err(FsError::Io(format!("directory not empty: {}", path)));
        }

        let mut dirs = self.dirs.write().unwrap();
        if !path.is_empty() && dirs.remove(&path) {
            return Ok(());
        }

        Err(FsError::NotFound(path))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        let dirs = self.dirs.read().unwrap();
        Ok(files.contains_key(&path) || dirs.contains(&path))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        if path.is_empty() {
            return Ok(()); // Root always exists
        }
        if self.dirs.read().unwrap().contains(&path) {
            return Ok(());
        }
        self.check_writable(&path)?;

        // Create parent first
        if let Some(parent) = Self::parent_path(&path) {
            Box::pin(self.mkdir(&parent)).await?;
        }

        let mut dirs = self.dirs.write().unwrap();
        dirs.insert(path);
        Ok(())
    }
}

// Implement FileSystem for Arc<T> where T: FileSystem
// This lets tests keep a handle on the filesystem a store owns
#[async_trait]
impl<T: FileSystem + Send + Sync> FileSystem for std::sync::Arc<T> {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        (**self).write(path, content).await
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        (**self).list(path).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        (**self).delete(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        (**self).mkdir(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inmemory_fs_basic_operations() {
        let fs = InMemoryFs::new();

        fs.write("options.txt", b"fov:70").await.unwrap();

        let content = fs.read("options.txt").await.unwrap();
        assert_eq!(content, b"fov:70");

        assert!(fs.exists("options.txt").await.unwrap());
        assert!(!fs.exists("servers.dat").await.unwrap());

        fs.delete("options.txt").await.unwrap();
        assert!(!fs.exists("options.txt").await.unwrap());
        assert!(matches!(
            fs.read("options.txt").await,
            Err(FsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_inmemory_fs_directories() {
        let fs = InMemoryFs::new();

        // Write creates parent directories
        fs.write("config/create/client.toml", b"content").await.unwrap();

        assert!(fs.exists("config").await.unwrap());
        assert!(fs.exists("config/create").await.unwrap());

        let entries = fs.list("config").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "create");
        assert!(entries[0].is_dir);

        let entries = fs.list("config/create").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "client.toml");
        assert!(!entries[0].is_dir);

        // Non-empty directories cannot be deleted
        assert!(fs.delete("config/create").await.is_err());
        fs.delete("config/create/client.toml").await.unwrap();
        fs.delete("config/create").await.unwrap();
        assert!(!fs.exists("config/create").await.unwrap());
    }

    #[tokio::test]
    async fn test_denied_writes_fail() {
        let fs = InMemoryFs::new();
        fs.write("config/a.toml", b"a").await.unwrap();
        fs.deny_writes("config");

        assert!(matches!(
            fs.write("config/b.toml", b"b").await,
            Err(FsError::Io(_))
        ));
        assert!(fs.delete("config/a.toml").await.is_err());
        // Reads are unaffected
        assert_eq!(fs.read("config/a.toml").await.unwrap(), b"a");

        fs.allow_writes();
        fs.write("config/b.toml", b"b").await.unwrap();
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join_path("", ".mced-backups"), ".mced-backups");
        assert_eq!(join_path("instance/", ".mced-backups"), "instance/.mced-backups");
        assert_eq!(file_name("config/create/client.toml"), "client.toml");
        assert_eq!(file_name("client.toml"), "client.toml");
    }
}
