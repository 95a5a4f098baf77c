//! Crawl orchestrator - main collection run logic
//!
//! This module drives one collection run for a single source type:
//! - Setting up one crawl session per worker
//! - Loading the ordered entity list
//! - Crawling each entity with retry and duplicate detection wired in
//! - Saving records and audit rows, isolating per-entity failures
//! - Releasing sessions, notifying and reporting no matter how the run ended

use crate::crawler::dedup::DuplicateDetector;
use crate::crawler::registry::SessionProvider;
use crate::crawler::retry::{RetryCondition, RetryPolicy};
use crate::crawler::session::{crawl_entity, CrawlContext, CrawlSession};
use crate::crawler::sink::DataSink;
use crate::model::{Entity, SourceType};
use crate::output::{
    completion_body, completion_subject, LogNotifier, Notifier, RunOutcome, RunReport, RunStats,
};
use crate::storage::{AuditStore, DocumentStore, EntitySource};
use crate::{HarvestError, Result};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-worker counters, merged into `RunStats` after the workers finish
#[derive(Debug, Default)]
struct Tally {
    succeeded: u64,
    failed: u64,
    records: u64,
    stopped_at_duplicate: u64,
}

/// Runs a full collection cycle for one source type
pub struct Orchestrator {
    source: SourceType,
    sessions: Arc<dyn SessionProvider>,
    entities: Arc<dyn EntitySource>,
    audit: Arc<dyn AuditStore>,
    documents: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    condition: RetryCondition,
    operator_id: String,
    workers: usize,
    config_hash: Option<String>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Creates an orchestrator with a log notifier, default retry policy and
    /// a single worker
    pub fn new(
        source: SourceType,
        sessions: Arc<dyn SessionProvider>,
        entities: Arc<dyn EntitySource>,
        audit: Arc<dyn AuditStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            source,
            sessions,
            entities,
            audit,
            documents,
            notifier: Arc::new(LogNotifier),
            retry: RetryPolicy::default(),
            condition: RetryCondition::default(),
            operator_id: "autoSystem".to_string(),
            workers: 1,
            config_hash: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy, condition: RetryCondition) -> Self {
        self.retry = retry;
        self.condition = condition;
        self
    }

    pub fn with_operator_id(mut self, operator_id: impl Into<String>) -> Self {
        self.operator_id = operator_id.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the run between entities when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the collection cycle
    ///
    /// Never fails: fatal conditions end up as `RunOutcome::Aborted`. Session
    /// release, the completion notification and the final report always run.
    pub async fn run(&self) -> RunReport {
        let started = Instant::now();
        let mut stats = RunStats::new(Utc::now());
        let mut sessions: Vec<Box<dyn CrawlSession>> = Vec::new();

        info!(
            "Starting {} collection with {} worker(s)",
            self.source, self.workers
        );

        let outcome = match self.setup_sessions(&mut sessions).await {
            Err(e) => self.abort("session setup failed", e),
            Ok(()) => match self.entities.list_entities(self.source) {
                Err(e) => self.abort("loading entities failed", e.into()),
                Ok(entities) if entities.is_empty() => {
                    info!("No entities to collect for {}", self.source);
                    RunOutcome::NothingToDo
                }
                Ok(entities) => {
                    stats.total_entities = entities.len() as u64;
                    info!("Collecting {} for {} entities", self.source, entities.len());
                    self.process_all(entities, &sessions, &mut stats).await
                }
            },
        };

        let report = RunReport {
            source: self.source,
            outcome,
            stats,
            elapsed: started.elapsed(),
        };

        self.finalize(sessions, &report).await;
        report
    }

    /// Creates and sets up one session per worker
    ///
    /// Sessions are kept even when their setup fails so finalization can
    /// release them.
    async fn setup_sessions(&self, sessions: &mut Vec<Box<dyn CrawlSession>>) -> Result<()> {
        for worker in 0..self.workers {
            let session = self.sessions.create_session()?;
            sessions.push(session);
            if let Some(session) = sessions.last_mut() {
                session.setup().await.map_err(|e| {
                    HarvestError::Setup(format!("worker {} session: {}", worker, e))
                })?;
            }
        }
        debug!("{} session(s) ready", sessions.len());
        Ok(())
    }

    fn abort(&self, context: &str, error: HarvestError) -> RunOutcome {
        let reason = format!("{}: {}", context, error);
        error!("{} collection aborted: {}", self.source, reason);
        if let Err(e) = self.audit.log_error(self.source, "run", &reason) {
            warn!("Could not write error log row: {}", e);
        }
        RunOutcome::Aborted { reason }
    }

    async fn process_all(
        &self,
        entities: Vec<Entity>,
        sessions: &[Box<dyn CrawlSession>],
        stats: &mut RunStats,
    ) -> RunOutcome {
        let queue = Mutex::new(VecDeque::from(entities));
        let detector = DuplicateDetector::new(self.documents.clone());
        let sink = DataSink::new(
            self.documents.clone(),
            self.audit.clone(),
            self.operator_id.clone(),
        );
        let ctx = CrawlContext {
            source: self.source,
            retry: &self.retry,
            condition: &self.condition,
            detector: &detector,
            audit: self.audit.as_ref(),
        };

        let tallies = futures::future::join_all(
            sessions
                .iter()
                .map(|session| self.worker(session.as_ref(), &queue, &ctx, &sink)),
        )
        .await;

        for tally in tallies {
            stats.succeeded += tally.succeeded;
            stats.failed += tally.failed;
            stats.total_records += tally.records;
            stats.stopped_at_duplicate += tally.stopped_at_duplicate;
        }

        let remaining = queue.lock().unwrap_or_else(PoisonError::into_inner).len() as u64;
        if remaining > 0 {
            warn!(
                "{} collection interrupted, {} entities left",
                self.source, remaining
            );
            RunOutcome::Interrupted { remaining }
        } else {
            RunOutcome::Completed
        }
    }

    /// Pulls entities off the shared queue until it is empty or the run is
    /// cancelled
    async fn worker(
        &self,
        session: &dyn CrawlSession,
        queue: &Mutex<VecDeque<Entity>>,
        ctx: &CrawlContext<'_>,
        sink: &DataSink,
    ) -> Tally {
        let mut tally = Tally::default();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let entity = match queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
            {
                Some(entity) => entity,
                None => break,
            };

            match self.process_one(session, &entity, ctx, sink).await {
                Ok((records, stopped)) => {
                    tally.succeeded += 1;
                    tally.records += records as u64;
                    if stopped {
                        tally.stopped_at_duplicate += 1;
                    }
                    info!(
                        "{} ({}): {} records saved{}",
                        entity.display_name,
                        entity.id,
                        records,
                        if stopped { ", stopped at duplicate" } else { "" }
                    );
                }
                Err(e) => {
                    tally.failed += 1;
                    error!(
                        "{} ({}) failed for {}: {}",
                        entity.display_name, entity.id, self.source, e
                    );
                    let location = format!("entity {} ({})", entity.id, entity.display_name);
                    if let Err(log_err) = self.audit.log_error(self.source, &location, &e.to_string())
                    {
                        warn!("Could not write error log row: {}", log_err);
                    }
                }
            }
        }

        tally
    }

    /// Crawls and saves one entity, returning the saved record count and
    /// whether it stopped at a duplicate
    async fn process_one(
        &self,
        session: &dyn CrawlSession,
        entity: &Entity,
        ctx: &CrawlContext<'_>,
        sink: &DataSink,
    ) -> Result<(usize, bool)> {
        let outcome = crawl_entity(session, entity, ctx).await?;
        let stopped = outcome.is_duplicate_stop();
        let records = outcome.into_records();
        let count = records.len();

        if !sink.save(self.source, &entity.id, records).await {
            return Err(HarvestError::Persistence(format!(
                "audit rows for {} records were not written",
                count
            )));
        }

        Ok((count, stopped))
    }

    /// Releases sessions, sends the notification and logs the summary
    async fn finalize(&self, sessions: Vec<Box<dyn CrawlSession>>, report: &RunReport) {
        for (worker, mut session) in sessions.into_iter().enumerate() {
            if let Err(e) = session.close().await {
                warn!("Closing session of worker {} failed: {}", worker, e);
            }
        }

        announce(self.notifier.as_ref(), report, self.config_hash.as_deref()).await;
    }
}

/// Sends the completion notification and logs the run summary
async fn announce(notifier: &dyn Notifier, report: &RunReport, config_hash: Option<&str>) {
    let subject = completion_subject(report);
    let body = completion_body(report, config_hash);
    if !notifier.send(&subject, &body).await {
        warn!("Completion notification was not delivered");
    }

    let stats = &report.stats;
    info!(
        "{} collection {}: {} succeeded, {} failed, {} records in {:.1}s",
        report.source,
        report.outcome,
        stats.succeeded,
        stats.failed,
        stats.total_records,
        report.elapsed.as_secs_f64()
    );
}

/// Reports a run that could not start because its stores or HTTP client
/// were unavailable
///
/// Sends the one completion notification such a run gets and returns its
/// `Aborted` report.
pub async fn abort_before_run(
    source: SourceType,
    reason: impl Into<String>,
    notifier: &dyn Notifier,
    config_hash: Option<&str>,
) -> RunReport {
    let reason = reason.into();
    error!("{} collection aborted before start: {}", source, reason);

    let report = RunReport {
        source,
        outcome: RunOutcome::Aborted { reason },
        stats: RunStats::new(Utc::now()),
        elapsed: Duration::ZERO,
    };
    announce(notifier, &report, config_hash).await;
    report
}
