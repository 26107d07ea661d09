//! Configuration module for tarseal
//!
//! This module provides configuration management including:
//! - Base and backup directory resolution
//! - User settings persistence

pub mod paths;
pub mod settings;

pub use paths::BackupPaths;
pub use settings::{NotifierKind, ReplicatorKind, Settings};
