//! cloudstash - cloud backup and restore for shop data
//!
//! This library provides the core of the cloudstash backup tool. A shop's
//! local dataset (products, sales, settings) is saved as timestamped JSON
//! snapshots in a storage container, listed, pruned by a retention policy
//! and restored on demand.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `models`: Dataset, wire document, snapshots and retention policy
//! - `auth`: Sessions and credential providers
//! - `backend`: Storage backends (memory, local directory, Gist, Drive)
//! - `engine`: The vendor-independent backup engine
//! - `data`: Access to the local dataset
//! - `notify`: User-visible status messages
//! - `services`: Restore flow and the auto-backup timer
//! - `display`: Terminal formatting
//! - `cli`: Command handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use cloudstash::config::{Settings, StashPaths};
//! use cloudstash::cli::AppContext;
//!
//! let paths = StashPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let ctx = AppContext::build(paths, settings, None)?;
//! let snapshots = ctx.engine.list_backups().await?;
//! ```

pub mod auth;
pub mod backend;
pub mod cli;
pub mod config;
pub mod data;
pub mod display;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod services;

pub use engine::BackupSyncEngine;
pub use error::{BackupError, BackupResult};
