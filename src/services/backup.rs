//! Backup service
//!
//! Provides the user-facing backup operations on top of the engine,
//! including the restore flow: validate, back up current data, then write.

use std::path::Path;

use tracing::warn;

use crate::data::DataSource;
use crate::engine::BackupSyncEngine;
use crate::error::{BackupError, BackupResult};
use crate::models::{
    BackupDetails, BackupDocument, ContainerId, Dataset, RetentionPolicy, SnapshotId, SnapshotRef,
    SnapshotSummary,
};
use crate::notify::NotificationSink;

/// Label of the safety backup taken before every restore
pub const PRE_RESTORE_LABEL: &str = "pre_restore";

/// What a restore did
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// Backup of the data that was overwritten
    pub safety_backup: SnapshotRef,
    pub products: usize,
    pub sales: usize,
}

impl RestoreOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Restored {} product(s) and {} sale(s); previous data saved as {}",
            self.products, self.sales, self.safety_backup.name
        )
    }
}

/// Snapshot of the backup setup for `auth status` and friends
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub backend: &'static str,
    pub signed_in: bool,
    pub account: Option<String>,
    pub container: Option<ContainerId>,
    pub snapshot_count: usize,
    pub latest: Option<SnapshotSummary>,
    pub retention: RetentionPolicy,
}

/// Service for backup management
pub struct BackupService<'a> {
    engine: &'a BackupSyncEngine,
    data: &'a dyn DataSource,
    notifier: &'a dyn NotificationSink,
}

impl<'a> BackupService<'a> {
    /// Create a new backup service
    pub fn new(
        engine: &'a BackupSyncEngine,
        data: &'a dyn DataSource,
        notifier: &'a dyn NotificationSink,
    ) -> Self {
        Self {
            engine,
            data,
            notifier,
        }
    }

    /// Back up the current local data
    pub async fn backup_now(&self, label: Option<&str>) -> BackupResult<SnapshotRef> {
        let dataset = self.data.read_snapshot()?;
        let snapshot = self.engine.create_backup(&dataset, label).await?;

        self.notifier.success(&format!(
            "Backup created: {} ({} product(s), {} sale(s))",
            snapshot.name,
            dataset.products.len(),
            dataset.sales.len()
        ));
        Ok(snapshot)
    }

    /// All snapshots, newest first
    pub async fn list(&self) -> BackupResult<Vec<SnapshotSummary>> {
        self.engine.list_backups().await
    }

    /// Find a snapshot by id, entry name, or `latest`
    pub async fn resolve(&self, reference: &str) -> BackupResult<SnapshotSummary> {
        let reference = reference.trim();
        let snapshots = self.engine.list_backups().await?;

        let found = if reference.eq_ignore_ascii_case("latest") {
            snapshots.into_iter().next()
        } else {
            snapshots.into_iter().find(|s| {
                s.id.as_str() == reference
                    || s.name == reference
                    || crate::engine::naming::display_name(&s.name) == reference
            })
        };

        found.ok_or_else(|| BackupError::snapshot_not_found(reference))
    }

    /// Summarize a snapshot without touching local data
    pub async fn details(&self, id: &SnapshotId) -> BackupResult<BackupDetails> {
        self.engine.backup_details(id).await
    }

    /// Replace local data with a snapshot
    ///
    /// The snapshot is fetched and validated first. Only then is the
    /// current data backed up under the `pre_restore` label and
    /// overwritten. If any step fails, local data is left as it was.
    pub async fn restore(&self, id: &SnapshotId) -> BackupResult<RestoreOutcome> {
        let restored = self.engine.restore_backup(id).await?;
        self.replace_local(restored).await
    }

    /// Replace local data with a payload obtained outside the container,
    /// such as a backup shared by link
    ///
    /// Validation and the `pre_restore` safety backup work as in `restore`.
    pub async fn import(&self, payload: &[u8]) -> BackupResult<RestoreOutcome> {
        let restored = BackupDocument::parse(payload)?.into_dataset();
        self.replace_local(restored).await
    }

    async fn replace_local(&self, restored: Dataset) -> BackupResult<RestoreOutcome> {
        let current = self.data.read_snapshot()?;
        let safety_backup = self
            .engine
            .create_backup(&current, Some(PRE_RESTORE_LABEL))
            .await?;
        self.notifier
            .info(&format!("Current data saved as {}", safety_backup.name));

        self.data.write_snapshot(&restored)?;

        let outcome = RestoreOutcome {
            safety_backup,
            products: restored.products.len(),
            sales: restored.sales.len(),
        };
        self.notifier.success(&outcome.summary());
        Ok(outcome)
    }

    /// Delete a snapshot
    pub async fn delete(&self, id: &SnapshotId) -> BackupResult<()> {
        self.engine.delete_backup(id).await?;
        self.notifier.success(&format!("Backup deleted: {}", id));
        Ok(())
    }

    /// Apply the configured retention policy now
    pub async fn prune(&self) -> BackupResult<usize> {
        let policy = self.engine.options().retention;
        let deleted = self.engine.prune_by_retention(&policy).await?;

        if deleted == 0 {
            self.notifier
                .info(&format!("Nothing to prune ({})", policy.describe()));
        } else {
            self.notifier
                .success(&format!("Deleted {} old backup(s)", deleted));
        }
        Ok(deleted)
    }

    /// Save a snapshot to a local file
    pub async fn download(&self, id: &SnapshotId, destination: &Path) -> BackupResult<u64> {
        let bytes = self.engine.download_backup(id, destination).await?;
        self.notifier
            .success(&format!("Saved backup to {}", destination.display()));
        Ok(bytes)
    }

    /// Report sign-in state, account and snapshot count
    pub async fn status(&self) -> BackupResult<StatusReport> {
        let signed_in = self.engine.is_signed_in().await;
        let mut report = StatusReport {
            backend: self.engine.backend_name(),
            signed_in,
            account: None,
            container: None,
            snapshot_count: 0,
            latest: None,
            retention: self.engine.options().retention,
        };
        if !signed_in {
            return Ok(report);
        }

        report.account = match self.engine.account_name().await {
            Ok(account) => account,
            Err(e) if e.is_auth_required() => {
                report.signed_in = false;
                return Ok(report);
            }
            Err(e) => {
                warn!(error = %e, "could not look up account");
                None
            }
        };

        let snapshots = self.engine.list_backups().await?;
        report.container = self.engine.cached_container().await;
        report.snapshot_count = snapshots.len();
        report.latest = snapshots.into_iter().next();
        Ok(report)
    }
}
