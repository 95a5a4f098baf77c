//! SQLite document store
//!
//! Stores documents as JSON text and answers natural-key lookups with
//! `json_extract`. Used when no Elasticsearch cluster is configured.

use crate::model::SourceType;
use crate::storage::schema::initialize_document_schema;
use crate::storage::sqlite::format_timestamp;
use crate::storage::traits::{BulkOutcome, Document, DocumentStore, StorageError, StorageResult};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite document store backend
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        initialize_document_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_document_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Loads every document for one entity and source, in insertion order
    pub fn documents_for(&self, source: SourceType, entity_id: &str) -> StorageResult<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT collected_at, collected_by, data FROM documents
             WHERE source_type = ?1 AND entity_id = ?2 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![source.as_str(), entity_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(collected_at, collected_by, data)| {
                Ok(Document {
                    entity_id: entity_id.to_string(),
                    source_type: source,
                    collected_at: crate::storage::sqlite::parse_timestamp(&collected_at)?,
                    collected_by,
                    data: data.as_deref().map(serde_json::from_str).transpose()?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert_documents(&self, documents: &[Document]) -> StorageResult<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for document in documents {
            let data = match document.data.as_ref().map(serde_json::to_string).transpose() {
                Ok(data) => data,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(e.to_string());
                    continue;
                }
            };

            match tx.execute(
                "INSERT INTO documents (entity_id, source_type, collected_at, collected_by, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    document.entity_id,
                    document.source_type.as_str(),
                    format_timestamp(document.collected_at),
                    document.collected_by,
                    data
                ],
            ) {
                Ok(_) => outcome.indexed += 1,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(e.to_string());
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    async fn count_matching(
        &self,
        source: SourceType,
        entity_id: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<u64> {
        let path = format!("$.{}", field);
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM documents
             WHERE source_type = ?1 AND entity_id = ?2
             AND CAST(json_extract(data, ?3) AS TEXT) = ?4",
            params![source.as_str(), entity_id, path, value],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
