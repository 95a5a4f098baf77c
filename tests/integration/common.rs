//! Shared fixtures: scripted crawl sessions, a recording notifier and stores

use async_trait::async_trait;
use entity_harvest::crawler::{
    CrawlSession, CredentialPool, RetryCondition, RetryPolicy, SessionProvider,
};
use entity_harvest::output::Notifier;
use entity_harvest::storage::{Document, DocumentStore, SqliteAuditStore, SqliteDocumentStore};
use entity_harvest::{Candidate, Entity, HarvestError, Record, Result, SourceType};
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Patent candidate with application number `A-<n>`
pub fn patent_candidate(n: usize) -> Candidate {
    let key = format!("A-{}", n);
    Candidate::new(
        Some(key.clone()),
        json!({ "application_number": key, "title": format!("Invention {}", n) }),
    )
}

/// Splits `1..=total` into pages of `page_size`
pub fn patent_pages(total: usize, page_size: usize) -> Vec<Vec<Candidate>> {
    let all: Vec<Candidate> = (1..=total).map(patent_candidate).collect();
    all.chunks(page_size).map(|c| c.to_vec()).collect()
}

/// What every session created from it serves
#[derive(Default)]
pub struct ScriptedSource {
    pub pages: HashMap<String, Vec<Vec<Candidate>>>,

    /// Entities whose search fails with the given HTTP status
    pub failing: HashMap<String, u16>,

    pub fail_setup: bool,
    pub pool: Option<Arc<CredentialPool>>,
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
}

impl ScriptedSource {
    pub fn with_pages(mut self, entity_id: &str, pages: Vec<Vec<Candidate>>) -> Self {
        self.pages.insert(entity_id.to_string(), pages);
        self
    }

    pub fn with_failure(mut self, entity_id: &str, status: u16) -> Self {
        self.failing.insert(entity_id.to_string(), status);
        self
    }

    pub fn provider(self: &Arc<Self>) -> Arc<dyn SessionProvider> {
        let source = self.clone();
        Arc::new(move || -> Result<Box<dyn CrawlSession>> {
            source.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSession {
                source: source.clone(),
                remaining: Mutex::new(VecDeque::new()),
                total: Mutex::new(0),
            }))
        })
    }
}

pub struct ScriptedSession {
    source: Arc<ScriptedSource>,
    remaining: Mutex<VecDeque<Vec<Candidate>>>,
    total: Mutex<u64>,
}

#[async_trait]
impl CrawlSession for ScriptedSession {
    async fn setup(&mut self) -> Result<()> {
        if self.source.fail_setup {
            return Err(HarvestError::Setup("browser did not start".to_string()));
        }
        Ok(())
    }

    async fn search(&self, entity: &Entity) -> Result<()> {
        if let Some(status) = self.source.failing.get(&entity.id) {
            return Err(HarvestError::Status {
                status: *status,
                url: format!("http://upstream.test/search?q={}", entity.id),
            });
        }

        let pages = self.source.pages.get(&entity.id).cloned().unwrap_or_default();
        *self.total.lock().unwrap() = pages.iter().map(|p| p.len() as u64).sum();
        *self.remaining.lock().unwrap() = pages.into_iter().collect();
        Ok(())
    }

    async fn total_count(&self) -> Result<u64> {
        Ok(*self.total.lock().unwrap())
    }

    async fn next_page(&self) -> Result<Vec<Candidate>> {
        Ok(self.remaining.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn has_more_pages(&self) -> bool {
        !self.remaining.lock().unwrap().is_empty()
    }

    async fn extract(&self, candidate: &Candidate) -> Result<Record> {
        Ok(Record::try_from(candidate.payload.clone()).unwrap())
    }

    fn credential_pool(&self) -> Option<Arc<CredentialPool>> {
        self.source.pool.clone()
    }

    async fn close(&mut self) -> Result<()> {
        self.source.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every notification it is asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_subject(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(s, _)| s.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        !self.fail
    }
}

/// Audit store holding `ids` as entities
pub fn audit_with_entities(ids: &[&str]) -> Arc<SqliteAuditStore> {
    let audit = SqliteAuditStore::open_in_memory().unwrap();
    for id in ids {
        audit
            .upsert_entity(&Entity::new(*id, format!("Company {}", id)))
            .unwrap();
    }
    Arc::new(audit)
}

pub async fn store_patent(documents: &SqliteDocumentStore, entity_id: &str, n: usize) {
    let record = Record::try_from(patent_candidate(n).payload).unwrap();
    documents
        .insert_documents(&[Document::record(
            entity_id,
            SourceType::Patent,
            Utc::now(),
            "autoSystem",
            record,
        )])
        .await
        .unwrap();
}

/// Retry settings that keep tests fast
pub fn fast_retry() -> (RetryPolicy, RetryCondition) {
    (
        RetryPolicy::new(5, Duration::from_millis(1), 2.0, Duration::from_millis(5)),
        RetryCondition::default(),
    )
}
