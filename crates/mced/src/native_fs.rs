//! Native filesystem implementation using tokio::fs.

use async_trait::async_trait;
use mced_core::fs::{FileEntry, FileSystem, FsError, Result};
use std::io;
use std::path::PathBuf;
use tokio::fs;

/// Filesystem rooted at a Minecraft instance directory
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

fn map_err(path: &str, e: io::Error) -> FsError {
    match e.kind() {
        io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        _ => FsError::Io(format!("{}: {}", path, e)),
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        if full_path.is_dir() {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        fs::read(&full_path).await.map_err(|e| map_err(path, e))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        // Create parent directories if needed
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_err(path, e))?;
        }

        fs::write(&full_path, content)
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let full_path = self.full_path(path);
        let mut entries = Vec::new();

        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| map_err(path, e))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| map_err(path, e))? {
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry.file_type().await.map_err(|e| map_err(path, e))?;

            entries.push(FileEntry {
                name,
                is_dir: file_type.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        let metadata = fs::symlink_metadata(&full_path)
            .await
            .map_err(|e| map_err(path, e))?;

        if metadata.is_dir() {
            fs::remove_dir(&full_path)
                .await
                .map_err(|e| map_err(path, e))
        } else {
            fs::remove_file(&full_path)
                .await
                .map_err(|e| map_err(path, e))
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        fs::try_exists(&full_path)
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| map_err(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_native_fs_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let fs = NativeFs::new(temp_dir.path().to_path_buf());

        fs.write("config/jei/jei-client.toml", b"cheatMode = false\n")
            .await
            .unwrap();
        assert_eq!(
            fs.read("config/jei/jei-client.toml").await.unwrap(),
            b"cheatMode = false\n"
        );
        assert!(fs.exists("config/jei").await.unwrap());

        let entries = fs.list("config").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "jei");
        assert!(entries[0].is_dir);

        fs.delete("config/jei/jei-client.toml").await.unwrap();
        fs.delete("config/jei").await.unwrap();
        assert!(!fs.exists("config/jei").await.unwrap());
    }

    #[tokio::test]
    async fn test_native_fs_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let fs = NativeFs::new(temp_dir.path().to_path_buf());

        assert!(matches!(
            fs.read("config/missing.toml").await,
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            fs.delete("config/missing.toml").await,
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            fs.list(".mced-backups").await,
            Err(FsError::NotFound(_))
        ));

        fs.mkdir("config").await.unwrap();
        assert!(matches!(
            fs.read("config").await,
            Err(FsError::IsDirectory(_))
        ));
    }
}
