use mced_core::BackupConfig;
use std::path::PathBuf;

/// Environment variable naming the instance directory.
pub const INSTANCE_ENV: &str = "MCED_INSTANCE_PATH";

/// Resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the Minecraft instance
    pub instance_path: PathBuf,
    /// Backup directory name and retention
    pub backup: BackupConfig,
}

impl Config {
    /// Configuration for an instance directory with default backup settings.
    pub fn new(instance_path: PathBuf) -> Self {
        Self {
            instance_path,
            backup: BackupConfig::default(),
        }
    }

    /// Resolve the instance path from an argument or, failing that, from
    /// `MCED_INSTANCE_PATH`. Supports `~` for the home directory.
    pub fn resolve(instance: Option<&str>) -> Result<Self, ConfigError> {
        let raw = match instance {
            Some(path) => path.to_string(),
            None => std::env::var(INSTANCE_ENV).map_err(|_| ConfigError::MissingInstancePath)?,
        };

        let instance_path = expand_tilde(&raw);
        if !instance_path.is_dir() {
            return Err(ConfigError::InstanceNotFound(instance_path));
        }

        Ok(Self::new(instance_path))
    }

    pub fn with_max_backups(mut self, max_per_file: usize) -> Self {
        self.backup.max_per_file = max_per_file;
        self
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No instance given: pass --instance or set MCED_INSTANCE_PATH")]
    MissingInstancePath,

    #[error("Instance directory not found: {}", .0.display())]
    InstanceNotFound(PathBuf),
}
