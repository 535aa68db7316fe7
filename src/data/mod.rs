//! Local dataset access
//!
//! The host application's data is reached only through the `DataSource`
//! trait. The engine reads from it for backups; writing a restored dataset
//! back is left to the calling layer.

pub mod file_io;

use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{BackupError, BackupResult};
use crate::models::Dataset;

pub use file_io::{read_json, write_bytes_atomic, write_json_atomic};

/// Boundary to the host application's local store
pub trait DataSource: Send + Sync {
    /// Read the current local state
    fn read_snapshot(&self) -> BackupResult<Dataset>;

    /// Replace the local state entirely (no merge)
    fn write_snapshot(&self, dataset: &Dataset) -> BackupResult<()>;
}

/// Dataset stored as one JSON file
#[derive(Debug, Clone)]
pub struct JsonFileDataSource {
    path: PathBuf,
}

impl JsonFileDataSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl DataSource for JsonFileDataSource {
    fn read_snapshot(&self) -> BackupResult<Dataset> {
        read_json(&self.path)
    }

    fn write_snapshot(&self, dataset: &Dataset) -> BackupResult<()> {
        write_json_atomic(&self.path, dataset)
    }
}

/// In-process dataset, mostly for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    dataset: Mutex<Dataset>,
    writes: Mutex<usize>,
}

impl MemoryDataSource {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset: Mutex::new(dataset),
            writes: Mutex::new(0),
        }
    }

    /// Number of `write_snapshot` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    /// Current contents
    pub fn current(&self) -> Dataset {
        self.dataset
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl DataSource for MemoryDataSource {
    fn read_snapshot(&self) -> BackupResult<Dataset> {
        self.dataset
            .lock()
            .map(|d| d.clone())
            .map_err(|_| BackupError::Io("dataset lock poisoned".into()))
    }

    fn write_snapshot(&self, dataset: &Dataset) -> BackupResult<()> {
        let mut current = self
            .dataset
            .lock()
            .map_err(|_| BackupError::Io("dataset lock poisoned".into()))?;
        *current = dataset.clone();
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        Ok(())
    }
}
