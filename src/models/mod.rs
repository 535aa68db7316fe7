//! Core data models for cloudstash
//!
//! This module contains the data structures shared by the engine and the
//! storage backends: the dataset being backed up, its wire document,
//! snapshot listings and retention rules.

pub mod dataset;
pub mod ids;
pub mod snapshot;

pub use dataset::{BackupDocument, BackupInfo, Dataset, Product, Sale};
pub use ids::{ContainerId, SnapshotId};
pub use snapshot::{
    BackupDetails, EntryMeta, EntryMetadata, EntryRef, RetentionPolicy, SnapshotRef,
    SnapshotSummary,
};
