//! SQLite audit store
//!
//! This module provides the relational side of persistence: the entity list,
//! the check log, the append-only count log and the error log.

use crate::model::{Entity, SourceType};
use crate::storage::schema::initialize_audit_schema;
use crate::storage::traits::{
    AuditStore, CountLogRow, EntitySource, ErrorLogRow, SourceSummary, StorageError,
    StorageResult,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite audit store backend
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Opens or creates the audit database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_audit_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_audit_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Inserts or renames an entity
    pub fn upsert_entity(&self, entity: &Entity) -> StorageResult<()> {
        self.conn()?.execute(
            "INSERT INTO entities (id, display_name, secondary_name) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name,
             secondary_name = excluded.secondary_name",
            params![entity.id, entity.display_name, entity.secondary_name],
        )?;
        Ok(())
    }

    fn query_entities(
        conn: &Connection,
        sql: &str,
        source: SourceType,
    ) -> StorageResult<Vec<Entity>> {
        let mut stmt = conn.prepare(sql)?;
        let entities = stmt
            .query_map(params![source.as_str()], |row| {
                Ok(Entity {
                    id: row.get(0)?,
                    display_name: row.get(1)?,
                    secondary_name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }
}

impl EntitySource for SqliteAuditStore {
    fn list_entities(&self, source: SourceType) -> StorageResult<Vec<Entity>> {
        let conn = self.conn()?;

        let unchecked = Self::query_entities(
            &conn,
            "SELECT e.id, e.display_name, e.secondary_name FROM entities e
             WHERE NOT EXISTS (
                 SELECT 1 FROM check_log c WHERE c.entity_id = e.id AND c.source_type = ?1
             )
             ORDER BY e.id",
            source,
        )?;

        if !unchecked.is_empty() {
            return Ok(unchecked);
        }

        Self::query_entities(
            &conn,
            "SELECT e.id, e.display_name, e.secondary_name FROM entities e
             JOIN check_log c ON c.entity_id = e.id AND c.source_type = ?1
             ORDER BY c.checked_at ASC, e.id",
            source,
        )
    }
}

impl AuditStore for SqliteAuditStore {
    fn record_check(
        &self,
        entity_id: &str,
        source: SourceType,
        count: usize,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let at = format_timestamp(at);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO check_log (entity_id, source_type, checked_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(entity_id, source_type) DO UPDATE SET checked_at = excluded.checked_at",
            params![entity_id, source.as_str(), at],
        )?;
        tx.execute(
            "INSERT INTO count_log (entity_id, source_type, count, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![entity_id, source.as_str(), count as i64, at],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn log_error(&self, source: SourceType, location: &str, message: &str) -> StorageResult<()> {
        self.conn()?.execute(
            "INSERT INTO error_log (source_type, location, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![source.as_str(), location, message, format_timestamp(Utc::now())],
        )?;
        Ok(())
    }

    fn last_checked(
        &self,
        entity_id: &str,
        source: SourceType,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        let checked_at: Option<String> = self
            .conn()?
            .query_row(
                "SELECT checked_at FROM check_log WHERE entity_id = ?1 AND source_type = ?2",
                params![entity_id, source.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        checked_at.as_deref().map(parse_timestamp).transpose()
    }

    fn count_log(&self, entity_id: &str, source: SourceType) -> StorageResult<Vec<CountLogRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, source_type, count, created_at FROM count_log
             WHERE entity_id = ?1 AND source_type = ?2 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![entity_id, source.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(entity_id, source_type, count, created_at)| {
                Ok(CountLogRow {
                    entity_id,
                    source_type,
                    count: count as u64,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    fn error_log(&self, source: SourceType) -> StorageResult<Vec<ErrorLogRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_type, location, message, created_at FROM error_log
             WHERE source_type = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![source.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(source_type, location, message, created_at)| {
                Ok(ErrorLogRow {
                    source_type,
                    location,
                    message,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    fn collection_summary(&self) -> StorageResult<Vec<SourceSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_type, COUNT(*), COALESCE(SUM(count), 0), COUNT(DISTINCT entity_id),
             MAX(created_at)
             FROM count_log GROUP BY source_type ORDER BY source_type",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(source_type, attempts, records, entities, last)| {
                Ok(SourceSummary {
                    source_type,
                    attempts: attempts as u64,
                    records: records as u64,
                    entities_checked: entities as u64,
                    last_checked: last.as_deref().map(parse_timestamp).transpose()?,
                })
            })
            .collect()
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}
