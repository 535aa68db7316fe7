//! Storage backends
//!
//! A backend is the vendor-specific half of the backup system: it knows
//! how to find or create the container, upload a JSON entry, list, fetch
//! and delete entries. Every call is a single attempt; retrying is left
//! to the caller.

pub mod drive;
pub mod gist;
pub mod local;
pub mod memory;

pub use drive::DriveBackend;
pub use gist::GistBackend;
pub use local::LocalBackend;
pub use memory::MemoryBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::Session;
use crate::config::{ProviderKind, Settings, StashPaths};
use crate::error::{BackupError, BackupResult};
use crate::models::{ContainerId, EntryMeta, EntryMetadata, EntryRef, SnapshotId};

/// Raw storage operations a vendor adapter provides
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs and status output
    fn name(&self) -> &'static str;

    /// Look up the container called `name`
    async fn find_container(&self, session: &Session, name: &str)
        -> BackupResult<Option<ContainerId>>;

    /// Create a container called `name`
    async fn create_container(&self, session: &Session, name: &str) -> BackupResult<ContainerId>;

    /// Store `content` as a new entry in `container`
    async fn upload_entry(
        &self,
        session: &Session,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
        metadata: &EntryMetadata,
    ) -> BackupResult<EntryRef>;

    /// List the entries of `container` whose names use `prefix`
    async fn list_entries(
        &self,
        session: &Session,
        container: &ContainerId,
        prefix: &str,
    ) -> BackupResult<Vec<EntryMeta>>;

    /// Download the content of an entry
    async fn fetch_entry_content(&self, session: &Session, entry: &SnapshotId)
        -> BackupResult<Vec<u8>>;

    /// Delete an entry; deleting a missing entry succeeds
    async fn delete_entry(&self, session: &Session, entry: &SnapshotId) -> BackupResult<()>;

    /// Account the session belongs to, when the vendor can tell
    async fn account_name(&self, _session: &Session) -> BackupResult<Option<String>> {
        Ok(None)
    }
}

/// Build the backend selected in the settings
pub fn from_settings(
    provider: ProviderKind,
    settings: &Settings,
    paths: &StashPaths,
) -> BackupResult<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match provider {
        ProviderKind::Local => Arc::new(LocalBackend::new(paths.store_dir())),
        ProviderKind::Gist => Arc::new(GistBackend::new(&settings.gist.api_url)?),
        ProviderKind::Drive => Arc::new(DriveBackend::new(&settings.drive.api_url)?),
    };
    Ok(backend)
}

/// Map a non-success HTTP response to the error taxonomy
///
/// 401/403 mean the session is no good; anything else is reported as the
/// backend being unavailable with the vendor's status and message.
pub(crate) async fn error_from_response(response: reqwest::Response) -> BackupError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        tracing::debug!(status = status.as_u16(), body = %body, "backend rejected credentials");
        return BackupError::AuthRequired;
    }

    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string()
    } else {
        body
    };
    BackupError::backend_status(status.as_u16(), message)
}

/// Shared HTTP client construction for the REST backends
pub(crate) fn http_client() -> BackupResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("cloudstash/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BackupError::backend(format!("Failed to build HTTP client: {}", e)))
}
