//! Duplicate detection against already-ingested documents

use crate::model::SourceType;
use crate::storage::DocumentStore;
use crate::Result;
use std::sync::Arc;

/// Answers whether a natural key was already stored for an entity and source
///
/// Lookups are pure reads. Sources without a natural-key field are never
/// deduplicated.
#[derive(Clone)]
pub struct DuplicateDetector {
    documents: Arc<dyn DocumentStore>,
}

impl DuplicateDetector {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn is_duplicate(
        &self,
        source: SourceType,
        entity_id: &str,
        natural_key: &str,
    ) -> Result<bool> {
        let field = match source.natural_key_field() {
            Some(field) => field,
            None => return Ok(false),
        };

        let hits = self
            .documents
            .count_matching(source, entity_id, field, natural_key)
            .await?;
        Ok(hits > 0)
    }
}
