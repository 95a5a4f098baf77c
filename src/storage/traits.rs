//! Storage traits and error types
//!
//! This module defines the collaborator interfaces the orchestrator persists
//! through: the relational audit trail, the entity list, and the document store.

use crate::model::{Entity, Record, SourceType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Document store request failed: {0}")]
    Remote(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        Self::Remote(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One append-only count log row
#[derive(Debug, Clone, PartialEq)]
pub struct CountLogRow {
    pub entity_id: String,
    pub source_type: String,
    pub count: u64,
    pub created_at: DateTime<Utc>,
}

/// One error log row
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorLogRow {
    pub source_type: String,
    pub location: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Per-source collection volume, aggregated from the count log
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSummary {
    pub source_type: String,
    pub attempts: u64,
    pub records: u64,
    pub entities_checked: u64,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Supplies the ordered list of entities to process in a run
pub trait EntitySource: Send + Sync {
    /// Entities never checked for `source` first; otherwise all of them,
    /// least recently checked first
    fn list_entities(&self, source: SourceType) -> StorageResult<Vec<Entity>>;
}

/// Relational audit trail for collection attempts
///
/// Implementations must be safe to call from concurrent workers.
pub trait AuditStore: Send + Sync {
    /// Marks `entity_id` as checked for `source` at `at` and appends a count
    /// row for the same attempt
    ///
    /// Both writes succeed or neither does.
    fn record_check(
        &self,
        entity_id: &str,
        source: SourceType,
        count: usize,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Appends an error log row
    fn log_error(&self, source: SourceType, location: &str, message: &str) -> StorageResult<()>;

    /// Last time `entity_id` was checked for `source`
    fn last_checked(
        &self,
        entity_id: &str,
        source: SourceType,
    ) -> StorageResult<Option<DateTime<Utc>>>;

    /// All count rows for one entity and source, oldest first
    fn count_log(&self, entity_id: &str, source: SourceType) -> StorageResult<Vec<CountLogRow>>;

    /// All error rows for one source, oldest first
    fn error_log(&self, source: SourceType) -> StorageResult<Vec<ErrorLogRow>>;

    /// Collection volume per source
    fn collection_summary(&self) -> StorageResult<Vec<SourceSummary>>;
}

/// A stamped document as written to the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub entity_id: String,
    pub source_type: SourceType,
    pub collected_at: DateTime<Utc>,
    pub collected_by: String,

    /// `None` marks "checked, nothing found"
    pub data: Option<Record>,
}

impl Document {
    pub fn record(
        entity_id: &str,
        source_type: SourceType,
        collected_at: DateTime<Utc>,
        collected_by: &str,
        record: Record,
    ) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            source_type,
            collected_at,
            collected_by: collected_by.to_string(),
            data: Some(record),
        }
    }

    pub fn sentinel(
        entity_id: &str,
        source_type: SourceType,
        collected_at: DateTime<Utc>,
        collected_by: &str,
    ) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            source_type,
            collected_at,
            collected_by: collected_by.to_string(),
            data: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.data.is_none()
    }
}

/// Outcome of a bulk insert; individual documents may be rejected
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub indexed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Document store holding collected records
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Writes a batch of documents, reporting per-document rejections
    async fn insert_documents(&self, documents: &[Document]) -> StorageResult<BulkOutcome>;

    /// Counts documents for `(source, entity_id)` whose record field `field`
    /// equals `value` exactly
    async fn count_matching(
        &self,
        source: SourceType,
        entity_id: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<u64>;
}
