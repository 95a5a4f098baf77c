//! Entity-Harvest: a resilient collector for per-entity records
//!
//! This crate drives collection runs over a list of target entities (companies),
//! pulling patents, news, trend series and R&D project metadata from upstream
//! sources, deduplicating against what was already ingested, and persisting the
//! results into a document store plus a relational audit trail.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Entity-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("All {pool_size} credentials in the pool are exhausted")]
    CredentialPoolExhausted { pool_size: usize },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// HTTP status carried by this error, if it came from a response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http { source, .. } | Self::Reqwest(source) => {
                source.status().map(|s| s.as_u16())
            }
            _ => None,
        }
    }

    /// Whether the failure came from the transport rather than the upstream's answer
    pub fn is_transient_network(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http { source, .. } | Self::Reqwest(source) => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown source type: {0}")]
    UnknownSource(String),
}

/// Result type alias for Entity-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOutcome, Orchestrator, RetryPolicy};
pub use model::{Candidate, Entity, Record, SourceType};
pub use output::{RunOutcome, RunReport, RunStats};
