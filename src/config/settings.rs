//! User settings for cloudstash
//!
//! Manages the storage provider choice, container naming, retention policy
//! and auto-backup schedule.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::StashPaths;
use crate::error::BackupError;
use crate::models::RetentionPolicy;

/// Which storage backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Directory on the local filesystem (default)
    #[default]
    Local,
    /// Private GitHub gist
    Gist,
    /// Google Drive folder
    Drive,
}

impl ProviderKind {
    /// Key used for this provider in the credentials file
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Gist => "gist",
            Self::Drive => "drive",
        }
    }

    /// Whether this provider needs a token
    pub fn requires_token(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest auto-backup interval accepted (one year)
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Auto-backup timer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoBackupSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for AutoBackupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_interval_minutes(),
        }
    }
}

/// GitHub gist endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GistSettings {
    #[serde(default = "default_gist_api")]
    pub api_url: String,
}

impl Default for GistSettings {
    fn default() -> Self {
        Self {
            api_url: default_gist_api(),
        }
    }
}

/// Google Drive endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSettings {
    #[serde(default = "default_drive_api")]
    pub api_url: String,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            api_url: default_drive_api(),
        }
    }
}

/// User settings for cloudstash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Storage provider backing the container
    #[serde(default)]
    pub provider: ProviderKind,

    /// Name of the container (folder / gist description) holding backups
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Prefix of every backup entry name
    #[serde(default = "default_entry_prefix")]
    pub entry_prefix: String,

    /// Retention applied after each successful backup
    #[serde(default = "default_retention")]
    pub retention: RetentionPolicy,

    /// Unattended backup schedule
    #[serde(default)]
    pub auto_backup: AutoBackupSettings,

    #[serde(default)]
    pub gist: GistSettings,

    #[serde(default)]
    pub drive: DriveSettings,

    /// Dataset location override (defaults to data/dataset.json)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
}

fn default_schema_version() -> u32 {
    1
}

fn default_container_name() -> String {
    "Shop Backups".to_string()
}

fn default_entry_prefix() -> String {
    "shop_backup".to_string()
}

fn default_retention() -> RetentionPolicy {
    RetentionPolicy::keep_last(10)
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_gist_api() -> String {
    "https://api.github.com".to_string()
}

fn default_drive_api() -> String {
    "https://www.googleapis.com".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            provider: ProviderKind::default(),
            container_name: default_container_name(),
            entry_prefix: default_entry_prefix(),
            retention: default_retention(),
            auto_backup: AutoBackupSettings::default(),
            gist: GistSettings::default(),
            drive: DriveSettings::default(),
            data_file: None,
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &StashPaths) -> Result<Self, BackupError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| BackupError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                BackupError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            settings.validate()?;
            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &StashPaths) -> Result<(), BackupError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| BackupError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| BackupError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<(), BackupError> {
        if self.container_name.trim().is_empty() {
            return Err(BackupError::Config("container_name must not be empty".into()));
        }
        if self.entry_prefix.trim().is_empty() {
            return Err(BackupError::Config("entry_prefix must not be empty".into()));
        }
        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.auto_backup.interval_minutes) {
            return Err(BackupError::Config(format!(
                "auto_backup.interval_minutes must be between 1 and {}",
                MAX_INTERVAL_MINUTES
            )));
        }
        Ok(())
    }

    /// Where the local dataset lives
    pub fn dataset_path(&self, paths: &StashPaths) -> PathBuf {
        self.data_file
            .clone()
            .unwrap_or_else(|| paths.dataset_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.provider, ProviderKind::Local);
        assert_eq!(settings.container_name, "Shop Backups");
        assert_eq!(settings.entry_prefix, "shop_backup");
        assert_eq!(settings.retention.max_count, Some(10));
        assert_eq!(settings.auto_backup.interval_minutes, 60);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StashPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.provider = ProviderKind::Drive;
        settings.retention = RetentionPolicy::max_age(14);

        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.provider, ProviderKind::Drive);
        assert_eq!(loaded.retention, RetentionPolicy::max_age(14));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StashPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), r#"{"provider": "gist"}"#).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.provider, ProviderKind::Gist);
        assert_eq!(loaded.entry_prefix, "shop_backup");
        assert_eq!(loaded.gist.api_url, "https://api.github.com");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StashPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), r#"{"entry_prefix": "  "}"#).unwrap();

        let err = Settings::load_or_create(&paths).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));

        std::fs::write(
            paths.settings_file(),
            r#"{"auto_backup": {"enabled": true, "interval_minutes": 18446744073709551615}}"#,
        )
        .unwrap();
        let err = Settings::load_or_create(&paths).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }

    #[test]
    fn test_dataset_path_override() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StashPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        assert_eq!(settings.dataset_path(&paths), paths.dataset_file());

        settings.data_file = Some(PathBuf::from("/srv/shop/data.json"));
        assert_eq!(settings.dataset_path(&paths), PathBuf::from("/srv/shop/data.json"));
    }
}
