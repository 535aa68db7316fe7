//! Backup sync engine
//!
//! Orchestrates the backup lifecycle over any `StorageBackend`:
//!
//! - resolve the container once per session (find by name, else create)
//! - create a snapshot from a dataset, then apply the retention policy
//! - list snapshots newest first
//! - fetch and validate a snapshot for restore, preview or download
//! - delete snapshots, idempotently
//!
//! The engine never touches local state. Writing a restored dataset back,
//! and taking the `pre_restore` safety backup before doing so, is the job of
//! the calling layer (see `services::BackupService`).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cloudstash::auth::StaticCredentials;
//! use cloudstash::backend::MemoryBackend;
//! use cloudstash::engine::{BackupSyncEngine, EngineOptions};
//!
//! let engine = BackupSyncEngine::new(
//!     Arc::new(MemoryBackend::default()),
//!     Arc::new(StaticCredentials::new("token")),
//!     EngineOptions::default(),
//! );
//! let snapshot = engine.create_backup(&dataset, Some("before_sale")).await?;
//! let restored = engine.restore_backup(&snapshot.id).await?;
//! ```

pub mod clock;
pub mod naming;
pub mod retention;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{CredentialProvider, Session};
use crate::backend::StorageBackend;
use crate::config::Settings;
use crate::data::file_io::write_bytes_atomic;
use crate::error::{BackupError, BackupResult};
use crate::models::{
    BackupDetails, BackupDocument, ContainerId, Dataset, EntryMetadata, RetentionPolicy,
    SnapshotId, SnapshotRef, SnapshotSummary,
};

use self::clock::{Clock, SystemClock};

/// Naming and retention the engine works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Name of the container holding this install's snapshots
    pub container_name: String,
    /// Prefix of every entry name
    pub entry_prefix: String,
    /// Applied after every successful backup
    pub retention: RetentionPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            container_name: settings.container_name.clone(),
            entry_prefix: settings.entry_prefix.clone(),
            retention: settings.retention,
        }
    }
}

/// Resets the in-flight flag when a backup attempt ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Vendor-independent backup/restore engine
pub struct BackupSyncEngine {
    backend: Arc<dyn StorageBackend>,
    credentials: Arc<dyn CredentialProvider>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
    container: Mutex<Option<ContainerId>>,
    in_flight: AtomicBool,
}

impl BackupSyncEngine {
    /// Create an engine over `backend`, authenticating through `credentials`
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        credentials: Arc<dyn CredentialProvider>,
        options: EngineOptions,
    ) -> Self {
        Self {
            backend,
            credentials,
            clock: Arc::new(SystemClock),
            options,
            container: Mutex::new(None),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Current time according to the engine's clock
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Whether a `create_backup` call is currently running
    pub fn is_backup_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether the credential provider has a session
    pub async fn is_signed_in(&self) -> bool {
        self.credentials.is_signed_in().await
    }

    async fn session(&self) -> BackupResult<Session> {
        self.credentials.get_session().await
    }

    /// Find the container by its fixed name, creating it if missing
    ///
    /// The id is cached for the lifetime of the session. Resolutions inside
    /// one engine are serialized; two separate processes resolving at the
    /// same time can still both create a container.
    pub async fn resolve_container(&self) -> BackupResult<ContainerId> {
        let session = self.session().await?;
        self.resolve_with(&session).await
    }

    async fn resolve_with(&self, session: &Session) -> BackupResult<ContainerId> {
        let mut cached = self.container.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let name = &self.options.container_name;
        let id = match self.backend.find_container(session, name).await? {
            Some(id) => {
                debug!(container = %id, "found existing container");
                id
            }
            None => {
                let id = self.backend.create_container(session, name).await?;
                info!(container = %id, name = %name, backend = self.backend.name(), "created backup container");
                id
            }
        };

        *cached = Some(id.clone());
        Ok(id)
    }

    /// The container id resolved so far, if any
    pub async fn cached_container(&self) -> Option<ContainerId> {
        self.container.lock().await.clone()
    }

    /// Upload `dataset` as a new snapshot, then apply retention
    ///
    /// Overlapping calls are rejected with `BackupInProgress` rather than
    /// queued. A retention failure after a successful upload is logged and
    /// does not fail the backup.
    pub async fn create_backup(
        &self,
        dataset: &Dataset,
        label: Option<&str>,
    ) -> BackupResult<SnapshotRef> {
        let _guard =
            InFlightGuard::acquire(&self.in_flight).ok_or(BackupError::BackupInProgress)?;

        let session = self.session().await?;
        let container = self.resolve_with(&session).await?;

        let now = self.clock.now();
        let name = naming::entry_name(&self.options.entry_prefix, now, label);
        let content = BackupDocument::from_dataset(dataset, now).to_bytes()?;
        let metadata = EntryMetadata::json(Some(describe(now, label)));

        let entry = self
            .backend
            .upload_entry(&session, &container, &name, content, &metadata)
            .await?;
        info!(
            snapshot = %entry.id,
            name = %entry.name,
            bytes = entry.size_bytes,
            products = dataset.products.len(),
            sales = dataset.sales.len(),
            "backup created"
        );

        if !self.options.retention.is_unbounded() {
            match self
                .prune_with(&session, &container, &self.options.retention, Some(&entry))
                .await
            {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, "pruned old backups"),
                Err(e) => warn!(error = %e, "retention pruning failed; backup kept"),
            }
        }

        Ok(entry.into())
    }

    /// List snapshots, newest first, without payloads
    ///
    /// Returns an empty list when there is no session.
    pub async fn list_backups(&self) -> BackupResult<Vec<SnapshotSummary>> {
        let session = match self.session().await {
            Ok(session) => session,
            Err(BackupError::AuthRequired) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        self.list_with(&session).await
    }

    async fn list_with(&self, session: &Session) -> BackupResult<Vec<SnapshotSummary>> {
        let container = self.resolve_with(session).await?;
        let mut entries = self
            .backend
            .list_entries(session, &container, &self.options.entry_prefix)
            .await?;
        retention::sort_newest_first(&mut entries);
        Ok(entries)
    }

    /// Fetch and validate a snapshot
    ///
    /// Local state is not modified.
    pub async fn restore_backup(&self, id: &SnapshotId) -> BackupResult<Dataset> {
        let (document, _) = self.fetch_document(id).await?;
        Ok(document.into_dataset())
    }

    async fn fetch_document(&self, id: &SnapshotId) -> BackupResult<(BackupDocument, Vec<u8>)> {
        let session = self.session().await?;
        let bytes = self.backend.fetch_entry_content(&session, id).await?;
        let document = BackupDocument::parse(&bytes)?;
        Ok((document, bytes))
    }

    /// Save a validated snapshot to a local file, returning its size
    pub async fn download_backup(&self, id: &SnapshotId, destination: &Path) -> BackupResult<u64> {
        let (_, bytes) = self.fetch_document(id).await?;
        write_bytes_atomic(destination, &bytes)?;
        info!(snapshot = %id, path = %destination.display(), "backup downloaded");
        Ok(bytes.len() as u64)
    }

    /// Summarize what a snapshot contains
    pub async fn backup_details(&self, id: &SnapshotId) -> BackupResult<BackupDetails> {
        let (document, _) = self.fetch_document(id).await?;
        Ok(BackupDetails {
            id: id.clone(),
            total_products: document.products.len(),
            total_sales: document.sales.len(),
            has_settings: !document.settings.is_empty(),
            info: document.backup_info,
        })
    }

    /// Delete a snapshot; a missing snapshot counts as deleted
    pub async fn delete_backup(&self, id: &SnapshotId) -> BackupResult<()> {
        let session = self.session().await?;
        match self.backend.delete_entry(&session, id).await {
            Ok(()) => {
                info!(snapshot = %id, "backup deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Delete every snapshot the policy does not keep, oldest first
    pub async fn prune_by_retention(&self, policy: &RetentionPolicy) -> BackupResult<usize> {
        let session = self.session().await?;
        let container = self.resolve_with(&session).await?;
        self.prune_with(&session, &container, policy, None).await
    }

    /// `fresh` is the entry a backup just wrote; it always survives
    async fn prune_with(
        &self,
        session: &Session,
        container: &ContainerId,
        policy: &RetentionPolicy,
        fresh: Option<&SnapshotSummary>,
    ) -> BackupResult<usize> {
        let mut snapshots = self
            .backend
            .list_entries(session, container, &self.options.entry_prefix)
            .await?;
        // Listings can lag behind an upload
        if let Some(fresh) = fresh {
            if !snapshots.iter().any(|s| s.id == fresh.id) {
                snapshots.push(fresh.clone());
            }
        }
        let expired = retention::select_expired_keeping(
            &snapshots,
            policy,
            self.clock.now(),
            fresh.map(|f| &f.id),
        );

        let mut deleted = 0;
        for snapshot in &expired {
            match self.backend.delete_entry(session, &snapshot.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            debug!(snapshot = %snapshot.id, name = %snapshot.name, "deleted expired backup");
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Account name reported by the backend for the current session
    pub async fn account_name(&self) -> BackupResult<Option<String>> {
        let session = self.session().await?;
        self.backend.account_name(&session).await
    }

    /// Account name for an explicit session, bypassing the credential provider
    pub async fn account_name_for(&self, session: &Session) -> BackupResult<Option<String>> {
        self.backend.account_name(session).await
    }

    /// Revoke the session and forget the resolved container
    pub async fn sign_out(&self) -> BackupResult<()> {
        self.credentials.sign_out().await?;
        *self.container.lock().await = None;
        Ok(())
    }
}

fn describe(now: chrono::DateTime<chrono::Utc>, label: Option<&str>) -> String {
    let mut description = format!("Shop backup - {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) {
        description.push_str(" - ");
        description.push_str(label);
    }
    description
}
