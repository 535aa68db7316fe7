//! In-process storage backend
//!
//! Keeps containers and entries in memory. Creation times come from the
//! injected clock, which makes it the backend of choice for tests. A few
//! hooks let tests hold uploads open or make deletes fail.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use uuid::Uuid;

use super::StorageBackend;
use crate::auth::Session;
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::naming;
use crate::error::{BackupError, BackupResult};
use crate::models::{ContainerId, EntryMeta, EntryMetadata, EntryRef, SnapshotId};

struct StoredEntry {
    container: ContainerId,
    meta: EntryMeta,
    content: Vec<u8>,
}

#[derive(Default)]
struct MemoryState {
    containers: BTreeMap<ContainerId, String>,
    entries: BTreeMap<SnapshotId, StoredEntry>,
    next_entry: u64,
}

/// Storage backend living entirely in memory
pub struct MemoryBackend {
    clock: Arc<dyn Clock>,
    state: Mutex<MemoryState>,
    upload_gate: Mutex<Option<Arc<Semaphore>>>,
    fail_deletes: AtomicBool,
    containers_created: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(MemoryState::default()),
            upload_gate: Mutex::new(None),
            fail_deletes: AtomicBool::new(false),
            containers_created: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> BackupResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| BackupError::backend("memory backend lock poisoned"))
    }

    /// Make every upload wait until `release_uploads` is called
    pub fn hold_uploads(&self) {
        if let Ok(mut slot) = self.upload_gate.lock() {
            *slot = Some(Arc::new(Semaphore::new(0)));
        }
    }

    /// Let held and future uploads through
    pub fn release_uploads(&self) {
        if let Ok(mut slot) = self.upload_gate.lock() {
            // Closing wakes every waiter with an error, which is the signal
            if let Some(gate) = slot.take() {
                gate.close();
            }
        }
    }

    /// Make `delete_entry` fail until switched off
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of containers created so far
    pub fn containers_created(&self) -> usize {
        self.containers_created.load(Ordering::SeqCst)
    }

    /// Number of entries currently stored
    pub fn entry_count(&self) -> usize {
        self.state().map(|s| s.entries.len()).unwrap_or(0)
    }

    /// Store raw bytes as an entry, bypassing the engine
    pub fn insert_raw(
        &self,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
    ) -> BackupResult<EntryMeta> {
        self.insert(container, name, content, None)
    }

    fn insert(
        &self,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
        description: Option<String>,
    ) -> BackupResult<EntryMeta> {
        let created_at = self.clock.now();
        let mut state = self.state()?;
        state.next_entry += 1;
        let meta = EntryMeta {
            id: SnapshotId::new(format!("entry-{:06}", state.next_entry)),
            name: name.to_string(),
            created_at,
            size_bytes: content.len() as u64,
            description,
        };
        state.entries.insert(
            meta.id.clone(),
            StoredEntry {
                container: container.clone(),
                meta: meta.clone(),
                content,
            },
        );
        Ok(meta)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn find_container(
        &self,
        _session: &Session,
        name: &str,
    ) -> BackupResult<Option<ContainerId>> {
        let state = self.state()?;
        Ok(state
            .containers
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_container(&self, _session: &Session, name: &str) -> BackupResult<ContainerId> {
        let id = ContainerId::new(Uuid::new_v4().to_string());
        self.state()?.containers.insert(id.clone(), name.to_string());
        self.containers_created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn upload_entry(
        &self,
        _session: &Session,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
        metadata: &EntryMetadata,
    ) -> BackupResult<EntryRef> {
        let gate = self.upload_gate.lock().ok().and_then(|g| g.clone());
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }

        if !self.state()?.containers.contains_key(container) {
            return Err(BackupError::container_not_found(container.as_str()));
        }

        self.insert(container, name, content, metadata.description.clone())
    }

    async fn list_entries(
        &self,
        _session: &Session,
        container: &ContainerId,
        prefix: &str,
    ) -> BackupResult<Vec<EntryMeta>> {
        let state = self.state()?;
        Ok(state
            .entries
            .values()
            .filter(|e| &e.container == container && naming::is_backup_entry(prefix, &e.meta.name))
            .map(|e| e.meta.clone())
            .collect())
    }

    async fn fetch_entry_content(
        &self,
        _session: &Session,
        entry: &SnapshotId,
    ) -> BackupResult<Vec<u8>> {
        self.state()?
            .entries
            .get(entry)
            .map(|e| e.content.clone())
            .ok_or_else(|| BackupError::snapshot_not_found(entry.as_str()))
    }

    async fn delete_entry(&self, _session: &Session, entry: &SnapshotId) -> BackupResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BackupError::backend_status(503, "delete disabled for test"));
        }
        self.state()?.entries.remove(entry);
        Ok(())
    }
}
