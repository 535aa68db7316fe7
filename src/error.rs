//! Custom error types for cloudstash
//!
//! This module defines the error taxonomy for backup operations using
//! thiserror for ergonomic error definitions.

use thiserror::Error;

/// The main error type for cloudstash operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// No valid session is available for the storage provider
    #[error("Authentication required: sign in to the storage provider first")]
    AuthRequired,

    /// Network or vendor-side failure
    #[error("{}", backend_message(*status, message))]
    BackendUnavailable {
        /// HTTP status reported by the vendor, if any
        status: Option<u16>,
        message: String,
    },

    /// Another backup is already running for this container
    #[error("A backup is already in progress")]
    BackupInProgress,

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Payload does not have the shape of a backup document
    #[error("Invalid backup format: {0}")]
    InvalidBackupFormat(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),
}

fn backend_message(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Storage backend unavailable ({}): {}", code, message),
        None => format!("Storage backend unavailable: {}", message),
    }
}

impl BackupError {
    /// Create a backend error without a status code
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            status: None,
            message: message.into(),
        }
    }

    /// Create a backend error carrying the vendor status code
    pub fn backend_status(status: u16, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a "not found" error for snapshots
    pub fn snapshot_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for containers
    pub fn container_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Container",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error means the user has to sign in
    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::AuthRequired)
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        Self::BackendUnavailable {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Result type alias for cloudstash operations
pub type BackupResult<T> = Result<T, BackupError>;
