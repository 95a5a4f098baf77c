//! Data sink: documents plus audit trail for one entity attempt

use crate::model::{Record, SourceType};
use crate::storage::{AuditStore, Document, DocumentStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Persists one entity's record batch and marks the attempt in the audit store
#[derive(Clone)]
pub struct DataSink {
    documents: Arc<dyn DocumentStore>,
    audit: Arc<dyn AuditStore>,
    operator_id: String,
}

impl DataSink {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditStore>,
        operator_id: impl Into<String>,
    ) -> Self {
        Self {
            documents,
            audit,
            operator_id: operator_id.into(),
        }
    }

    /// Writes `records` (or one sentinel when empty), then the check and
    /// count rows
    ///
    /// Returns `true` only when the audit rows were written. Partial document
    /// rejections are logged and do not fail the call; a failed document
    /// write skips the audit rows and returns `false`.
    pub async fn save(&self, source: SourceType, entity_id: &str, records: Vec<Record>) -> bool {
        let at = Utc::now();
        let count = records.len();

        let documents: Vec<Document> = if records.is_empty() {
            vec![Document::sentinel(entity_id, source, at, &self.operator_id)]
        } else {
            records
                .into_iter()
                .map(|r| Document::record(entity_id, source, at, &self.operator_id, r))
                .collect()
        };

        match self.documents.insert_documents(&documents).await {
            Ok(outcome) if outcome.failed > 0 => {
                warn!(
                    "{} of {} documents for {} ({}) were rejected: {}",
                    outcome.failed,
                    documents.len(),
                    entity_id,
                    source,
                    outcome.errors.join("; ")
                );
            }
            Ok(outcome) => {
                debug!("Stored {} documents for {} ({})", outcome.indexed, entity_id, source);
            }
            Err(e) => {
                // Nothing was accepted, so the attempt must not be marked checked
                error!("Document write for {} ({}) failed: {}", entity_id, source, e);
                return false;
            }
        }

        match self.audit.record_check(entity_id, source, count, at) {
            Ok(()) => true,
            Err(e) => {
                error!("Audit write for {} ({}) failed: {}", entity_id, source, e);
                false
            }
        }
    }
}
