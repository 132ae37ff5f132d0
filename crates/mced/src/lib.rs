//! mced library: exposes the command-line tool's modules for testing.
//!
//! Wires the mced-core stores to the native filesystem and to a JSON state
//! file inside the instance directory.

pub mod config;
pub mod native_fs;
pub mod persistence;
pub mod workspace;

// Re-export key types for convenience
pub use config::{Config, ConfigError, INSTANCE_ENV};
pub use native_fs::NativeFs;
pub use persistence::{StateFile, STATE_DIR, STATE_FILE};
pub use workspace::Workspace;
