//! Unattended auto-backup
//!
//! Fires on a fixed interval. A tick is skipped when there is no session,
//! when a backup is already running, or when the newest backup is younger
//! than half the interval. Failures are logged and the timer carries on;
//! there is no retry before the next tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::settings::MAX_INTERVAL_MINUTES;
use crate::data::DataSource;
use crate::engine::BackupSyncEngine;
use crate::error::BackupError;
use crate::models::SnapshotRef;

/// Label of backups taken by the timer
pub const AUTO_LABEL: &str = "auto_interval";

/// Why a tick did not back up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotSignedIn,
    InProgress,
    RecentBackup,
}

/// Result of a single tick
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Created(SnapshotRef),
    Skipped(SkipReason),
    Failed(String),
}

/// Periodic backup driver
pub struct AutoBackup {
    engine: Arc<BackupSyncEngine>,
    data: Arc<dyn DataSource>,
    interval: Duration,
}

impl AutoBackup {
    pub fn new(engine: Arc<BackupSyncEngine>, data: Arc<dyn DataSource>, interval: Duration) -> Self {
        Self {
            engine,
            data,
            interval,
        }
    }

    /// Build from the `interval_minutes` setting, kept within 1 minute
    /// and one year
    pub fn every_minutes(
        engine: Arc<BackupSyncEngine>,
        data: Arc<dyn DataSource>,
        minutes: u64,
    ) -> Self {
        let minutes = minutes.clamp(1, MAX_INTERVAL_MINUTES);
        Self::new(engine, data, Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one timer tick
    pub async fn tick(&self) -> TickOutcome {
        if !self.engine.is_signed_in().await {
            debug!("auto-backup skipped: not signed in");
            return TickOutcome::Skipped(SkipReason::NotSignedIn);
        }
        if self.engine.is_backup_in_progress() {
            debug!("auto-backup skipped: backup in progress");
            return TickOutcome::Skipped(SkipReason::InProgress);
        }

        let latest = match self.engine.list_backups().await {
            Ok(snapshots) => snapshots.into_iter().next(),
            Err(e) => return failed(e),
        };
        if let Some(latest) = latest {
            let half = chrono::Duration::seconds((self.interval.as_secs() / 2) as i64);
            if self.engine.now() - latest.created_at < half {
                debug!(latest = %latest.name, "auto-backup skipped: recent backup exists");
                return TickOutcome::Skipped(SkipReason::RecentBackup);
            }
        }

        let dataset = match self.data.read_snapshot() {
            Ok(dataset) => dataset,
            Err(e) => return failed(e),
        };
        match self.engine.create_backup(&dataset, Some(AUTO_LABEL)).await {
            Ok(snapshot) => {
                info!(snapshot = %snapshot.name, "auto-backup created");
                TickOutcome::Created(snapshot)
            }
            Err(BackupError::BackupInProgress) => TickOutcome::Skipped(SkipReason::InProgress),
            Err(e) => failed(e),
        }
    }

    /// Tick on the interval until `shutdown` resolves
    ///
    /// The first tick fires immediately.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "auto-backup started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!("auto-backup stopped");
    }
}

fn failed(error: BackupError) -> TickOutcome {
    warn!(error = %error, "auto-backup failed; waiting for next interval");
    TickOutcome::Failed(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialProvider, StaticCredentials};
    use crate::backend::MemoryBackend;
    use crate::data::MemoryDataSource;
    use crate::engine::clock::ManualClock;
    use crate::engine::EngineOptions;
    use crate::error::BackupResult;
    use crate::models::Dataset;
    use chrono::{TimeZone, Utc};

    struct Setup {
        auto: AutoBackup,
        backend: Arc<MemoryBackend>,
        clock: Arc<ManualClock>,
        credentials: Arc<StaticCredentials>,
    }

    fn setup_with(data: Arc<dyn DataSource>) -> Setup {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 5, 5, 12, 0, 0).unwrap(),
        ));
        let backend = Arc::new(MemoryBackend::new(clock.clone()));
        let credentials = Arc::new(StaticCredentials::new("token"));
        let engine = BackupSyncEngine::new(
            backend.clone(),
            credentials.clone(),
            EngineOptions::default(),
        )
        .with_clock(clock.clone());

        Setup {
            auto: AutoBackup::every_minutes(Arc::new(engine), data, 60),
            backend,
            clock,
            credentials,
        }
    }

    fn setup() -> Setup {
        setup_with(Arc::new(MemoryDataSource::new(Dataset::new())))
    }

    struct BrokenSource;

    impl DataSource for BrokenSource {
        fn read_snapshot(&self) -> BackupResult<Dataset> {
            Err(BackupError::Io("disk gone".into()))
        }

        fn write_snapshot(&self, _dataset: &Dataset) -> BackupResult<()> {
            Err(BackupError::Io("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn test_tick_creates_then_skips_recent() {
        let s = setup();

        let first = s.auto.tick().await;
        match first {
            TickOutcome::Created(snapshot) => assert!(snapshot.name.ends_with("_auto_interval.json")),
            other => panic!("expected a backup, got {other:?}"),
        }

        s.clock.advance(chrono::Duration::minutes(29));
        assert!(matches!(
            s.auto.tick().await,
            TickOutcome::Skipped(SkipReason::RecentBackup)
        ));

        s.clock.advance(chrono::Duration::minutes(1));
        assert!(matches!(s.auto.tick().await, TickOutcome::Created(_)));
        assert_eq!(s.backend.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_tick_skips_without_session() {
        let s = setup();
        s.credentials.sign_out().await.unwrap();

        assert!(matches!(
            s.auto.tick().await,
            TickOutcome::Skipped(SkipReason::NotSignedIn)
        ));
        assert_eq!(s.backend.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_raised() {
        let s = setup_with(Arc::new(BrokenSource));

        match s.auto.tick().await {
            TickOutcome::Failed(message) => assert!(message.contains("disk gone")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(s.backend.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_run_ticks_until_shutdown() {
        let s = setup();
        let backend = s.backend.clone();

        s.auto
            .run(async move {
                while backend.entry_count() == 0 {
                    tokio::task::yield_now().await;
                }
            })
            .await;

        assert_eq!(s.backend.entry_count(), 1);
    }

    #[test]
    fn test_interval_has_floor() {
        let s = setup();
        assert_eq!(s.auto.interval(), Duration::from_secs(3600));
        let zero = AutoBackup::every_minutes(
            s.auto.engine.clone(),
            Arc::new(MemoryDataSource::default()),
            0,
        );
        assert_eq!(zero.interval(), Duration::from_secs(60));

        let huge = AutoBackup::every_minutes(
            s.auto.engine.clone(),
            Arc::new(MemoryDataSource::default()),
            u64::MAX,
        );
        assert_eq!(
            huge.interval(),
            Duration::from_secs(MAX_INTERVAL_MINUTES * 60)
        );
    }
}
