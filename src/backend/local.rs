//! Local directory backend
//!
//! Each container is a directory under the store root and each entry is a
//! JSON file inside it. Entry ids have the form `<container>/<file name>`.
//! Useful offline, and as a second copy next to a cloud provider.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::StorageBackend;
use crate::auth::Session;
use crate::data::file_io::write_bytes_atomic;
use crate::engine::naming;
use crate::error::{BackupError, BackupResult};
use crate::models::{ContainerId, EntryMeta, EntryMetadata, EntryRef, SnapshotId};

/// Storage backend writing into a local directory tree
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &ContainerId) -> BackupResult<PathBuf> {
        if !is_plain_component(container.as_str()) {
            return Err(BackupError::container_not_found(container.as_str()));
        }
        Ok(self.root.join(container.as_str()))
    }

    /// Resolve an entry id to its file, rejecting anything that would
    /// escape the store root
    fn entry_path(&self, entry: &SnapshotId) -> BackupResult<PathBuf> {
        let (container, file) = entry
            .as_str()
            .split_once('/')
            .filter(|(c, f)| is_plain_component(c) && is_plain_component(f))
            .ok_or_else(|| BackupError::snapshot_not_found(entry.as_str()))?;
        Ok(self.root.join(container).join(file))
    }

    fn entry_meta(&self, container: &ContainerId, path: &Path, prefix: &str) -> Option<EntryMeta> {
        let name = path.file_name()?.to_string_lossy().to_string();
        if !naming::is_backup_entry(prefix, &name) {
            return None;
        }

        let metadata = fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }

        let created_at = created_at(&name, &metadata)?;

        Some(EntryMeta {
            id: SnapshotId::new(format!("{}/{}", container, name)),
            name,
            created_at,
            size_bytes: metadata.len(),
            description: None,
        })
    }
}

/// Creation time from the name stamp, sharpened by the file's mtime
fn created_at(name: &str, metadata: &fs::Metadata) -> Option<DateTime<Utc>> {
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    match (naming::entry_timestamp(name), modified) {
        (Some(stamp), Some(modified)) => Some(naming::refine_stamp(stamp, modified)),
        (stamp, modified) => stamp.or(modified),
    }
}

/// Turn a container name into a directory name
fn directory_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn is_plain_component(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && !part.contains(['/', '\\'])
}

/// Pick a file name that does not exist yet in `dir`
fn unused_name(dir: &Path, name: &str) -> String {
    if !dir.join(name).exists() {
        return name.to_string();
    }
    let stem = naming::display_name(name);
    (2..)
        .map(|n| format!("{}_{}{}", stem, n, naming::ENTRY_EXTENSION))
        .find(|candidate| !dir.join(candidate).exists())
        .unwrap_or_else(|| name.to_string())
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn find_container(
        &self,
        _session: &Session,
        name: &str,
    ) -> BackupResult<Option<ContainerId>> {
        let dir_name = directory_name(name);
        if dir_name.is_empty() {
            return Ok(None);
        }
        Ok(self
            .root
            .join(&dir_name)
            .is_dir()
            .then(|| ContainerId::new(dir_name)))
    }

    async fn create_container(&self, _session: &Session, name: &str) -> BackupResult<ContainerId> {
        let dir_name = directory_name(name);
        if dir_name.is_empty() {
            return Err(BackupError::Config("container name must not be empty".into()));
        }

        let dir = self.root.join(&dir_name);
        fs::create_dir_all(&dir).map_err(|e| {
            BackupError::Io(format!("Failed to create directory {}: {}", dir.display(), e))
        })?;
        Ok(ContainerId::new(dir_name))
    }

    async fn upload_entry(
        &self,
        _session: &Session,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
        _metadata: &EntryMetadata,
    ) -> BackupResult<EntryRef> {
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            return Err(BackupError::container_not_found(container.as_str()));
        }

        let file_name = unused_name(&dir, name);
        let path = dir.join(&file_name);
        write_bytes_atomic(&path, &content)?;
        debug!(path = %path.display(), bytes = content.len(), "wrote entry");

        let created_at = fs::metadata(&path)
            .ok()
            .and_then(|metadata| created_at(&file_name, &metadata))
            .unwrap_or_else(Utc::now);

        Ok(EntryMeta {
            id: SnapshotId::new(format!("{}/{}", container, file_name)),
            name: file_name,
            created_at,
            size_bytes: content.len() as u64,
            description: None,
        })
    }

    async fn list_entries(
        &self,
        _session: &Session,
        container: &ContainerId,
        prefix: &str,
    ) -> BackupResult<Vec<EntryMeta>> {
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            return Err(BackupError::container_not_found(container.as_str()));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)
            .map_err(|e| BackupError::Io(format!("Failed to read directory {}: {}", dir.display(), e)))?
        {
            let entry = entry
                .map_err(|e| BackupError::Io(format!("Failed to read directory entry: {}", e)))?;
            if let Some(meta) = self.entry_meta(container, &entry.path(), prefix) {
                entries.push(meta);
            }
        }
        Ok(entries)
    }

    async fn fetch_entry_content(
        &self,
        _session: &Session,
        entry: &SnapshotId,
    ) -> BackupResult<Vec<u8>> {
        let path = self.entry_path(entry)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackupError::snapshot_not_found(entry.as_str()))
            }
            Err(e) => Err(BackupError::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn delete_entry(&self, _session: &Session, entry: &SnapshotId) -> BackupResult<()> {
        let path = match self.entry_path(entry) {
            Ok(path) => path,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackupError::Io(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredentials;
    use crate::engine::clock::ManualClock;
    use crate::engine::{BackupSyncEngine, EngineOptions};
    use crate::models::{Dataset, RetentionPolicy};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn session() -> Session {
        Session::anonymous()
    }

    fn backend() -> (TempDir, LocalBackend) {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(temp_dir.path().join("store"));
        (temp_dir, backend)
    }

    #[tokio::test]
    async fn test_container_is_a_directory() {
        let (_temp, backend) = backend();
        assert!(backend
            .find_container(&session(), "Shop Backups")
            .await
            .unwrap()
            .is_none());

        let id = backend.create_container(&session(), "Shop Backups").await.unwrap();
        assert_eq!(id.as_str(), "Shop_Backups");
        assert!(backend.root().join("Shop_Backups").is_dir());
        assert_eq!(
            backend.find_container(&session(), "Shop Backups").await.unwrap(),
            Some(id)
        );
    }

    #[tokio::test]
    async fn test_upload_list_fetch_delete() {
        let (_temp, backend) = backend();
        let container = backend.create_container(&session(), "Shop").await.unwrap();

        let entry = backend
            .upload_entry(
                &session(),
                &container,
                "shop_backup_2025-01-02T03-04-05Z.json",
                br#"{"products":[]}"#.to_vec(),
                &EntryMetadata::json(None),
            )
            .await
            .unwrap();
        assert_eq!(entry.id.as_str(), "Shop/shop_backup_2025-01-02T03-04-05Z.json");
        assert_eq!(entry.created_at.to_rfc3339(), "2025-01-02T03:04:05+00:00");

        fs::write(backend.root().join("Shop").join("notes.txt"), "x").unwrap();

        let listed = backend
            .list_entries(&session(), &container, "shop_backup")
            .await
            .unwrap();
        assert_eq!(listed, vec![entry.clone()]);

        let content = backend.fetch_entry_content(&session(), &entry.id).await.unwrap();
        assert_eq!(content, br#"{"products":[]}"#);

        backend.delete_entry(&session(), &entry.id).await.unwrap();
        backend.delete_entry(&session(), &entry.id).await.unwrap();
        assert!(backend
            .fetch_entry_content(&session(), &entry.id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_same_name_gets_suffix() {
        let (_temp, backend) = backend();
        let container = backend.create_container(&session(), "Shop").await.unwrap();
        let name = "shop_backup_2025-01-02T03-04-05Z.json";

        let first = backend
            .upload_entry(&session(), &container, name, b"1".to_vec(), &EntryMetadata::json(None))
            .await
            .unwrap();
        let second = backend
            .upload_entry(&session(), &container, name, b"2".to_vec(), &EntryMetadata::json(None))
            .await
            .unwrap();

        assert_eq!(first.name, name);
        assert_eq!(second.name, "shop_backup_2025-01-02T03-04-05Z_2.json");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_ids_cannot_escape_root() {
        let (_temp, backend) = backend();
        let err = backend
            .fetch_entry_content(&session(), &SnapshotId::new("../secrets.json"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        backend
            .delete_entry(&session(), &SnapshotId::new("a/../../b"))
            .await
            .unwrap();
    }

    fn tagged(tag: &str) -> Dataset {
        Dataset {
            products: vec![json!({ "v": tag })],
            ..Dataset::default()
        }
    }

    fn engine_keeping_one(backend: &LocalBackend) -> BackupSyncEngine {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
        ));
        let options = EngineOptions {
            retention: RetentionPolicy::keep_last(1),
            ..EngineOptions::default()
        };
        BackupSyncEngine::new(
            Arc::new(backend.clone()),
            Arc::new(StaticCredentials::new("token")),
            options,
        )
        .with_clock(clock)
    }

    #[tokio::test]
    async fn test_retention_keeps_newest_within_one_second() {
        for (first, second) in [(Some("manual"), None), (None, Some("manual"))] {
            let (_temp, backend) = backend();
            let engine = engine_keeping_one(&backend);

            engine.create_backup(&tagged("old"), first).await.unwrap();
            let newest = engine.create_backup(&tagged("new"), second).await.unwrap();

            let surviving = engine.list_backups().await.unwrap();
            assert_eq!(surviving.len(), 1);
            assert_eq!(surviving[0].id, newest.id);

            let restored = engine.restore_backup(&newest.id).await.unwrap();
            assert_eq!(restored, tagged("new"));
        }
    }

    #[tokio::test]
    async fn test_mtime_orders_entries_from_the_same_second() {
        let (_temp, backend) = backend();
        let container = backend.create_container(&session(), "Shop Backups").await.unwrap();
        let stamp = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let dir = backend.root().join(container.as_str());

        // The labelled file is the older one here
        let older = "shop_backup_2025-03-10T09-00-00Z_manual.json";
        let newer = "shop_backup_2025-03-10T09-00-00Z.json";
        for (name, offset) in [(older, 200), (newer, 800)] {
            let path = dir.join(name);
            fs::write(&path, br#"{"products":[]}"#).unwrap();
            let modified = SystemTime::from(stamp + Duration::milliseconds(offset));
            fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(modified)
                .unwrap();
        }

        let engine = engine_keeping_one(&backend);
        assert_eq!(
            engine
                .prune_by_retention(&RetentionPolicy::keep_last(1))
                .await
                .unwrap(),
            1
        );

        let surviving = engine.list_backups().await.unwrap();
        assert_eq!(surviving.len(), 1);
        assert_eq!(surviving[0].name, newer);
        assert_eq!(surviving[0].created_at, stamp + Duration::milliseconds(800));
    }
}
