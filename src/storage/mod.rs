//! Storage module for persisting collection results
//!
//! This module handles:
//! - The SQLite audit store (entities, check log, count log, error log)
//! - Document stores holding the collected records (SQLite or Elasticsearch)

mod documents;
mod elastic;
mod schema;
mod sqlite;
mod traits;

pub use documents::SqliteDocumentStore;
pub use elastic::{ElasticCredentials, ElasticDocumentStore};
pub use sqlite::SqliteAuditStore;
pub use traits::{
    AuditStore, BulkOutcome, CountLogRow, Document, DocumentStore, EntitySource, ErrorLogRow,
    SourceSummary, StorageError, StorageResult,
};

use crate::config::{DocumentBackend, StorageConfig};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;

/// Opens or creates the audit database
pub fn open_audit_store(path: &Path) -> StorageResult<SqliteAuditStore> {
    SqliteAuditStore::new(path)
}

/// Opens the configured document store backend
///
/// `client` is only used by the Elasticsearch backend.
pub fn open_document_store(
    config: &StorageConfig,
    client: Client,
) -> StorageResult<Arc<dyn DocumentStore>> {
    match config.document_store {
        DocumentBackend::Sqlite => {
            let path = config.documents_database.as_deref().ok_or_else(|| {
                StorageError::Database("documents_database is not configured".to_string())
            })?;
            Ok(Arc::new(SqliteDocumentStore::new(Path::new(path))?))
        }
        DocumentBackend::Elasticsearch => {
            let url = config.elasticsearch_url.as_deref().ok_or_else(|| {
                StorageError::Database("elasticsearch_url is not configured".to_string())
            })?;
            let mut store = ElasticDocumentStore::new(client, url, &config.elasticsearch_index);
            if let (Some(username), Some(password)) = (
                &config.elasticsearch_username,
                &config.elasticsearch_password,
            ) {
                store = store.with_credentials(ElasticCredentials {
                    username: username.clone(),
                    password: password.clone(),
                });
            }
            Ok(Arc::new(store))
        }
    }
}
