//! Crawler module for per-entity record collection
//!
//! This module contains the core collection logic, including:
//! - Retry with backoff, audit logging and credential rotation
//! - Duplicate detection and the data sink
//! - The crawl session interface and its paginated crawl loop
//! - A JSON API session and the registry selecting sessions per source
//! - Overall run orchestration, including runs that fail before they start

mod api_session;
mod coordinator;
mod credentials;
mod dedup;
mod fetcher;
mod registry;
mod retry;
mod session;
mod sink;

pub use api_session::ApiSession;
pub use coordinator::{abort_before_run, Orchestrator};
pub use credentials::{Credential, CredentialPool};
pub use dedup::DuplicateDetector;
pub use fetcher::{build_http_client, ensure_status, fetch_json};
pub use registry::{ApiSessionProvider, SessionProvider, SessionRegistry};
pub use retry::{CredentialRotation, ErrorLogHook, RetryCondition, RetryHook, RetryPolicy};
pub use session::{crawl_entity, CrawlContext, CrawlOutcome, CrawlSession};
pub use sink::DataSink;

use crate::config::Config;
use crate::model::SourceType;
use crate::output::Notifier;
use crate::storage::{AuditStore, DocumentStore, EntitySource};
use crate::{HarvestError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Builds an orchestrator for `source` from the loaded configuration
///
/// The retry policy, worker count and operator id come from `config`; each
/// attempt is bounded by the HTTP request timeout. A source without a
/// registered session still gets an orchestrator, whose run aborts at setup.
pub fn orchestrator_for(
    config: &Config,
    registry: &SessionRegistry,
    source: SourceType,
    entities: Arc<dyn EntitySource>,
    audit: Arc<dyn AuditStore>,
    documents: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
) -> Orchestrator {
    let provider = registry.provider(source).unwrap_or_else(|e| {
        let reason = match e {
            HarvestError::Setup(message) => message,
            other => other.to_string(),
        };
        let missing: Arc<dyn SessionProvider> =
            Arc::new(move || -> Result<Box<dyn CrawlSession>> {
                Err(HarvestError::Setup(reason.clone()))
            });
        missing
    });
    let retry = RetryPolicy::from_config(&config.retry)
        .with_attempt_timeout(Duration::from_secs(config.http.request_timeout_secs));

    Orchestrator::new(source, provider, entities, audit, documents)
        .with_notifier(notifier)
        .with_retry(retry, RetryCondition::from_config(&config.retry))
        .with_operator_id(config.storage.operator_id.clone())
        .with_workers(config.run.workers as usize)
}
