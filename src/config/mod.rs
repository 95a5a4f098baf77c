//! Configuration module for Entity-Harvest
//!
//! This module handles loading, parsing, and validating the TOML configuration
//! that describes retry behavior, storage backends and the per-source APIs.
//!
//! # Example
//!
//! ```no_run
//! use entity_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Workers per run: {}", config.run.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CredentialEntry, DocumentBackend, HttpConfig, NotificationConfig, NotificationKind,
    QueryField, RetryConfig, RunConfig, SourceConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
