//! Crawl sessions and the paginated list-then-detail crawl loop

use crate::crawler::credentials::CredentialPool;
use crate::crawler::dedup::DuplicateDetector;
use crate::crawler::retry::{CredentialRotation, ErrorLogHook, RetryCondition, RetryPolicy};
use crate::model::{Candidate, Entity, Record, SourceType};
use crate::storage::AuditStore;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source-specific collaborator that lists and extracts records
///
/// A session is owned by exactly one worker. Query methods take `&self` so a
/// single step can be re-issued by the retry policy; implementations keep
/// their paging state behind interior mutability.
#[async_trait]
pub trait CrawlSession: Send + Sync {
    /// Acquires whatever the session needs (client, login, browser tab)
    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Starts a new result listing for `entity`
    async fn search(&self, entity: &Entity) -> Result<()>;

    /// Total number of hits reported for the current search
    async fn total_count(&self) -> Result<u64>;

    /// Candidates of the next result page
    async fn next_page(&self) -> Result<Vec<Candidate>>;

    fn has_more_pages(&self) -> bool;

    /// Full record for one candidate
    async fn extract(&self, candidate: &Candidate) -> Result<Record>;

    /// Credential pool rotated on rate limits, if the source uses one
    fn credential_pool(&self) -> Option<Arc<CredentialPool>> {
        None
    }

    /// Releases resources acquired in `setup`
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Result of crawling one entity
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlOutcome {
    /// Every page was consumed
    Complete(Vec<Record>),

    /// A known natural key was reached; holds what was collected before it
    StopAtDuplicate(Vec<Record>),
}

impl CrawlOutcome {
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Complete(records) | Self::StopAtDuplicate(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Complete(records) | Self::StopAtDuplicate(records) => records,
        }
    }

    pub fn is_duplicate_stop(&self) -> bool {
        matches!(self, Self::StopAtDuplicate(_))
    }
}

/// Shared collaborators for the crawl loop
pub struct CrawlContext<'a> {
    pub source: SourceType,
    pub retry: &'a RetryPolicy,
    pub condition: &'a RetryCondition,
    pub detector: &'a DuplicateDetector,
    pub audit: &'a dyn AuditStore,
}

/// Crawls one entity: search, then page through candidates, stopping at the
/// first candidate whose natural key is already stored
///
/// Every network-bound step runs under the retry policy. A candidate whose
/// extraction fails is skipped; any other error fails the entity.
pub async fn crawl_entity(
    session: &dyn CrawlSession,
    entity: &Entity,
    ctx: &CrawlContext<'_>,
) -> Result<CrawlOutcome> {
    let location = format!("entity {} ({})", entity.id, entity.display_name);
    let pool = session.credential_pool();
    let hooks = (
        ErrorLogHook::new(ctx.audit, ctx.source, &location),
        pool.as_deref()
            .map(|pool| CredentialRotation::new(pool, ctx.condition)),
    );

    ctx.retry
        .execute("search", || session.search(entity), ctx.condition, &hooks)
        .await?;

    let total = ctx
        .retry
        .execute("total count", || session.total_count(), ctx.condition, &hooks)
        .await?;

    if total == 0 {
        debug!("No results for {}", location);
        return Ok(CrawlOutcome::Complete(Vec::new()));
    }
    debug!("{} reports {} results", location, total);

    let mut records = Vec::new();
    let mut page = 0;

    while session.has_more_pages() {
        let candidates = ctx
            .retry
            .execute("next page", || session.next_page(), ctx.condition, &hooks)
            .await?;
        page += 1;

        if candidates.is_empty() {
            debug!("Page {} for {} is empty, stopping", page, location);
            break;
        }
        debug!(
            "Page {} for {}: {} candidates",
            page,
            location,
            candidates.len()
        );

        for candidate in &candidates {
            if let Some(key) = candidate.natural_key.as_deref() {
                let duplicate = ctx
                    .retry
                    .execute(
                        "duplicate check",
                        || ctx.detector.is_duplicate(ctx.source, &entity.id, key),
                        ctx.condition,
                        &(),
                    )
                    .await?;

                if duplicate {
                    info!(
                        "{} reached already collected key {} after {} new records",
                        location,
                        key,
                        records.len()
                    );
                    return Ok(CrawlOutcome::StopAtDuplicate(records));
                }
            }

            match ctx
                .retry
                .execute("extract", || session.extract(candidate), ctx.condition, &hooks)
                .await
            {
                Ok(record) => records.push(record),
                Err(HarvestError::Extraction(message)) => {
                    warn!("Skipping candidate of {}: {}", location, message);
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(CrawlOutcome::Complete(records))
}
