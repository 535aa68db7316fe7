//! Snapshot and retention models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dataset::BackupInfo;
use super::ids::SnapshotId;

/// Metadata about one entry as reported by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub id: SnapshotId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    #[serde(default)]
    pub description: Option<String>,
}

/// A stored backup as shown in listings (payload is never included)
pub type SnapshotSummary = EntryMeta;

/// Result of a successful upload
pub type EntryRef = EntryMeta;

/// What `create_backup` hands back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRef {
    pub id: SnapshotId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl From<EntryRef> for SnapshotRef {
    fn from(entry: EntryRef) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            created_at: entry.created_at,
            size_bytes: entry.size_bytes,
        }
    }
}

/// Free-form metadata attached to an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub description: Option<String>,
    pub content_type: &'static str,
}

impl EntryMetadata {
    /// JSON metadata with an optional description
    pub fn json(description: Option<String>) -> Self {
        Self {
            description,
            content_type: "application/json",
        }
    }
}

/// Rules for automatically pruning old snapshots
///
/// Both limits apply together when both are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep at most this many snapshots (newest first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
    /// Delete snapshots older than this many days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
}

impl RetentionPolicy {
    /// Policy that keeps the newest `count` snapshots
    pub fn keep_last(count: u32) -> Self {
        Self {
            max_count: Some(count),
            max_age_days: None,
        }
    }

    /// Policy that deletes snapshots older than `days`
    pub fn max_age(days: u32) -> Self {
        Self {
            max_count: None,
            max_age_days: Some(days),
        }
    }

    /// Check if the policy never deletes anything
    pub fn is_unbounded(&self) -> bool {
        self.max_count.is_none() && self.max_age_days.is_none()
    }

    /// Human-readable description
    pub fn describe(&self) -> String {
        match (self.max_count, self.max_age_days) {
            (None, None) => "keep everything".to_string(),
            (Some(c), None) => format!("keep newest {}", c),
            (None, Some(d)) => format!("keep last {} day(s)", d),
            (Some(c), Some(d)) => format!("keep newest {} within {} day(s)", c, d),
        }
    }
}

/// Contents of a backup as reported by `backup_details`
#[derive(Debug, Clone, PartialEq)]
pub struct BackupDetails {
    pub id: SnapshotId,
    pub total_products: usize,
    pub total_sales: usize,
    pub has_settings: bool,
    pub info: Option<BackupInfo>,
}

impl BackupDetails {
    /// One-line summary of the contents
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} product(s), {} sale(s)",
            self.total_products, self.total_sales
        );
        if let Some(version) = self.info.as_ref().and_then(|i| i.version.as_deref()) {
            out.push_str(&format!(", format v{}", version));
        }
        out
    }
}
