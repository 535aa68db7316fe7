//! Path management for cloudstash
//!
//! ## Path Resolution Order
//!
//! 1. `CLOUDSTASH_DATA_DIR` environment variable (if set)
//! 2. The platform config directory (`~/.config/cloudstash` on Linux,
//!    `~/Library/Application Support/cloudstash` on macOS,
//!    `%APPDATA%\cloudstash\config` on Windows)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::BackupError;

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "CLOUDSTASH_DATA_DIR";

/// Manages all paths used by cloudstash
#[derive(Debug, Clone)]
pub struct StashPaths {
    /// Base directory for all cloudstash data
    base_dir: PathBuf,
}

impl StashPaths {
    /// Create a new StashPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = if let Ok(custom) = std::env::var(DATA_DIR_ENV) {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create StashPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the data directory holding the local dataset
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Root of the local-directory storage backend
    pub fn store_dir(&self) -> PathBuf {
        self.base_dir.join("store")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to stored provider tokens
    pub fn credentials_file(&self) -> PathBuf {
        self.base_dir.join("credentials.json")
    }

    /// Get the path to the default dataset file
    pub fn dataset_file(&self) -> PathBuf {
        self.data_dir().join("dataset.json")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), BackupError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.data_dir())
            .map_err(|e| BackupError::Io(format!("Failed to create data directory: {}", e)))?;

        std::fs::create_dir_all(self.store_dir())
            .map_err(|e| BackupError::Io(format!("Failed to create store directory: {}", e)))?;

        Ok(())
    }

    /// Check if cloudstash has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

fn resolve_default_path() -> Result<PathBuf, BackupError> {
    ProjectDirs::from("", "", "cloudstash")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| BackupError::Config("Could not determine home directory".into()))
}
