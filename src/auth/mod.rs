//! Credential handling for storage providers
//!
//! The engine never performs sign-in itself. It asks a `CredentialProvider`
//! for a `Session` before each operation and hands that session to the
//! storage backend, so the lifecycle of a login is owned by whoever builds
//! the engine.

mod providers;

pub use providers::{OpenAccess, StaticCredentials, StoredCredentials};

use std::fmt;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::BackupResult;

/// An authenticated handle for one storage provider
#[derive(Clone)]
pub struct Session {
    token: Zeroizing<String>,
}

impl Session {
    /// Create a session from a bearer token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }

    /// Session for backends that need no credentials
    pub fn anonymous() -> Self {
        Self::new(String::new())
    }

    /// The bearer token
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_anonymous(&self) -> bool {
        self.token.is_empty()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &if self.is_anonymous() { "<none>" } else { "<redacted>" })
            .finish()
    }
}

/// Supplies sessions to the engine and revokes them on sign-out
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Get the current session, or `BackupError::AuthRequired`
    async fn get_session(&self) -> BackupResult<Session>;

    /// Revoke the current session
    async fn sign_out(&self) -> BackupResult<()>;

    /// Check whether a session is available without failing
    async fn is_signed_in(&self) -> bool {
        self.get_session().await.is_ok()
    }
}
