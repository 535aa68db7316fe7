//! Service layer for cloudstash
//!
//! The service layer sits between the CLI and the engine: it reads and
//! writes the local dataset, keeps the pre-restore safety backup in front
//! of every restore, and reports outcomes to a notification sink.

pub mod auto;
pub mod backup;

pub use auto::{AutoBackup, SkipReason, TickOutcome};
pub use backup::{BackupService, RestoreOutcome, StatusReport};
