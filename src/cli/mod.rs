//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the service layer.

pub mod auth;
pub mod backup;

pub use auth::{handle_auth_command, AuthCommands};
pub use backup::{handle_backup_command, BackupCommands};

use std::sync::Arc;

use tracing::debug;

use crate::auth::{CredentialProvider, OpenAccess, Session, StoredCredentials};
use crate::backend::{self, GistBackend};
use crate::config::{ProviderKind, Settings, StashPaths};
use crate::data::{DataSource, JsonFileDataSource};
use crate::engine::{BackupSyncEngine, EngineOptions};
use crate::error::BackupResult;

/// Environment variable overriding the stored provider token
pub const TOKEN_ENV: &str = "CLOUDSTASH_TOKEN";

/// Everything a command needs, wired from paths and settings
pub struct AppContext {
    pub paths: StashPaths,
    pub settings: Settings,
    pub provider: ProviderKind,
    pub engine: Arc<BackupSyncEngine>,
    pub data: Arc<dyn DataSource>,
}

impl AppContext {
    /// Build the engine for `provider` (or the configured one)
    pub fn build(
        paths: StashPaths,
        settings: Settings,
        provider: Option<ProviderKind>,
    ) -> BackupResult<Self> {
        let provider = provider.unwrap_or(settings.provider);
        let backend = backend::from_settings(provider, &settings, &paths)?;
        let credentials = credentials_for(&paths, provider);
        let engine = BackupSyncEngine::new(backend, credentials, EngineOptions::from_settings(&settings));
        let data: Arc<dyn DataSource> =
            Arc::new(JsonFileDataSource::new(settings.dataset_path(&paths)));

        debug!(provider = %provider, base_dir = %paths.base_dir().display(), "context ready");
        Ok(Self {
            paths,
            settings,
            provider,
            engine: Arc::new(engine),
            data,
        })
    }

    /// Token store for the active provider, ignoring `CLOUDSTASH_TOKEN`
    pub fn token_store(&self) -> StoredCredentials {
        StoredCredentials::new(self.paths.credentials_file(), self.provider)
    }

    /// Gist client for backups shared by link
    pub fn gist_backend(&self) -> BackupResult<GistBackend> {
        GistBackend::new(&self.settings.gist.api_url)
    }

    /// Gist session if one is known; shared gists can also be read without
    pub async fn gist_session(&self) -> Option<Session> {
        let from_env = if self.provider == ProviderKind::Gist {
            std::env::var(TOKEN_ENV).ok()
        } else {
            None
        };
        StoredCredentials::new(self.paths.credentials_file(), ProviderKind::Gist)
            .with_override(from_env)
            .get_session()
            .await
            .ok()
    }
}

fn credentials_for(paths: &StashPaths, provider: ProviderKind) -> Arc<dyn CredentialProvider> {
    if !provider.requires_token() {
        return Arc::new(OpenAccess);
    }
    let from_env = std::env::var(TOKEN_ENV).ok();
    Arc::new(StoredCredentials::new(paths.credentials_file(), provider).with_override(from_env))
}
