//! Database schema definitions
//!
//! This module contains the SQL schema for the audit database and for the
//! SQLite-backed document store.

/// SQL schema for the audit database
pub const AUDIT_SCHEMA_SQL: &str = r#"
-- Entities collected for (maintained externally)
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    secondary_name TEXT
);

-- Last time each entity was processed for each source
CREATE TABLE IF NOT EXISTS check_log (
    entity_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    checked_at TEXT NOT NULL,
    PRIMARY KEY (entity_id, source_type)
);

CREATE INDEX IF NOT EXISTS idx_check_log_source ON check_log(source_type, checked_at);

-- Records produced per processing attempt (append-only)
CREATE TABLE IF NOT EXISTS count_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    count INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_count_log_entity ON count_log(entity_id, source_type);

-- Collection errors
CREATE TABLE IF NOT EXISTS error_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_type TEXT NOT NULL,
    location TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_error_log_source ON error_log(source_type);
"#;

/// SQL schema for the SQLite document store
pub const DOCUMENT_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    collected_by TEXT NOT NULL,
    data TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_entity ON documents(source_type, entity_id);
"#;

/// Initializes the audit database schema
pub fn initialize_audit_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(AUDIT_SCHEMA_SQL)?;
    Ok(())
}

/// Initializes the document store schema
pub fn initialize_document_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(DOCUMENT_SCHEMA_SQL)?;
    Ok(())
}
