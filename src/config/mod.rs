//! Configuration module for cloudstash
//!
//! This module provides configuration management including:
//! - Base directory resolution
//! - User settings persistence

pub mod paths;
pub mod settings;

pub use paths::StashPaths;
pub use settings::{ProviderKind, Settings};
