//! Credential provider implementations

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use super::{CredentialProvider, Session};
use crate::config::ProviderKind;
use crate::data::file_io::{read_json, write_json_atomic};
use crate::error::{BackupError, BackupResult};

/// Provider for backends that need no login
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAccess;

#[async_trait]
impl CredentialProvider for OpenAccess {
    async fn get_session(&self) -> BackupResult<Session> {
        Ok(Session::anonymous())
    }

    async fn sign_out(&self) -> BackupResult<()> {
        Ok(())
    }
}

/// A session held in memory
#[derive(Debug, Default)]
pub struct StaticCredentials {
    session: Mutex<Option<Session>>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            session: Mutex::new(Some(Session::new(token))),
        }
    }

    /// A provider with no session
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Replace the held session
    pub fn sign_in(&self, token: impl Into<String>) {
        if let Ok(mut session) = self.session.lock() {
            *session = Some(Session::new(token));
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_session(&self) -> BackupResult<Session> {
        self.session
            .lock()
            .ok()
            .and_then(|s| s.clone())
            .ok_or(BackupError::AuthRequired)
    }

    async fn sign_out(&self) -> BackupResult<()> {
        if let Ok(mut session) = self.session.lock() {
            *session = None;
        }
        Ok(())
    }
}

/// Tokens kept in `credentials.json`, keyed by provider
///
/// An explicit token (from `CLOUDSTASH_TOKEN` or a CLI flag) takes
/// precedence over the stored one until `sign_out` is called.
pub struct StoredCredentials {
    path: PathBuf,
    provider: ProviderKind,
    override_token: Option<String>,
    signed_out: AtomicBool,
}

type TokenFile = BTreeMap<String, String>;

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("path", &self.path)
            .field("provider", &self.provider)
            .field("override_token", &self.override_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StoredCredentials {
    pub fn new(path: PathBuf, provider: ProviderKind) -> Self {
        Self {
            path,
            provider,
            override_token: None,
            signed_out: AtomicBool::new(false),
        }
    }

    /// Use `token` instead of the stored one when present
    pub fn with_override(mut self, token: Option<String>) -> Self {
        self.override_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Persist a token for this provider
    pub fn store_token(&self, token: &str) -> BackupResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(BackupError::Config("token must not be empty".into()));
        }

        let mut tokens: TokenFile = read_json(&self.path)?;
        tokens.insert(self.provider.as_str().to_string(), token.to_string());
        write_json_atomic(&self.path, &tokens)?;
        self.signed_out.store(false, Ordering::SeqCst);

        info!(provider = %self.provider, "stored provider token");
        Ok(())
    }

    fn stored_token(&self) -> BackupResult<Option<String>> {
        let tokens: TokenFile = read_json(&self.path)?;
        Ok(tokens.get(self.provider.as_str()).cloned())
    }
}

#[async_trait]
impl CredentialProvider for StoredCredentials {
    async fn get_session(&self) -> BackupResult<Session> {
        if self.signed_out.load(Ordering::SeqCst) {
            return Err(BackupError::AuthRequired);
        }
        if let Some(token) = &self.override_token {
            return Ok(Session::new(token.clone()));
        }
        self.stored_token()?
            .map(Session::new)
            .ok_or(BackupError::AuthRequired)
    }

    async fn sign_out(&self) -> BackupResult<()> {
        self.signed_out.store(true, Ordering::SeqCst);

        let mut tokens: TokenFile = read_json(&self.path)?;
        if tokens.remove(self.provider.as_str()).is_some() {
            write_json_atomic(&self.path, &tokens)?;
        }

        info!(provider = %self.provider, "signed out");
        Ok(())
    }
}
