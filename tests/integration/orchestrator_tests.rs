//! Orchestrator run semantics with scripted sessions

use crate::common::{
    audit_with_entities, fast_retry, patent_candidate, patent_pages, store_patent,
    RecordingNotifier, ScriptedSource,
};
use entity_harvest::crawler::{
    abort_before_run, orchestrator_for, Credential, CredentialPool, SessionRegistry,
};
use entity_harvest::storage::{open_audit_store, AuditStore, SqliteAuditStore, SqliteDocumentStore};
use entity_harvest::{Config, Orchestrator, RunOutcome, SourceType};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Harness {
    source: Arc<ScriptedSource>,
    audit: Arc<SqliteAuditStore>,
    documents: Arc<SqliteDocumentStore>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new(source: ScriptedSource, entity_ids: &[&str]) -> Self {
        Self {
            source: Arc::new(source),
            audit: audit_with_entities(entity_ids),
            documents: Arc::new(SqliteDocumentStore::open_in_memory().unwrap()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        let (retry, condition) = fast_retry();
        Orchestrator::new(
            SourceType::Patent,
            self.source.provider(),
            self.audit.clone(),
            self.audit.clone(),
            self.documents.clone(),
        )
        .with_notifier(self.notifier.clone())
        .with_retry(retry, condition)
    }
}

#[tokio::test]
async fn test_duplicate_on_second_page_saves_accumulated_records() {
    let harness = Harness::new(
        ScriptedSource::default().with_pages("E1", patent_pages(45, 30)),
        &["E1"],
    );
    // Global position 37 is page 2, candidate 7
    store_patent(&harness.documents, "E1", 37).await;

    let report = harness.orchestrator().run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.total_entities, 1);
    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.failed, 0);
    assert_eq!(report.stats.total_records, 36);
    assert_eq!(report.stats.stopped_at_duplicate, 1);

    let counts = harness.audit.count_log("E1", SourceType::Patent).unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].count, 36);

    let docs = harness
        .documents
        .documents_for(SourceType::Patent, "E1")
        .unwrap();
    // The pre-existing record plus the 36 new ones
    assert_eq!(docs.len(), 37);
    assert!(docs.iter().all(|d| !d.is_sentinel()));
}

#[tokio::test]
async fn test_check_log_and_count_log_written_together() {
    let harness = Harness::new(
        ScriptedSource::default()
            .with_pages("E1", patent_pages(3, 30))
            .with_pages("E2", vec![]),
        &["E1", "E2"],
    );

    harness.orchestrator().run().await;

    for id in ["E1", "E2"] {
        let checked = harness.audit.last_checked(id, SourceType::Patent).unwrap();
        let counts = harness.audit.count_log(id, SourceType::Patent).unwrap();
        assert_eq!(counts.len(), 1, "one count row for {}", id);
        assert_eq!(checked, Some(counts[0].created_at));
    }
}

#[tokio::test]
async fn test_failing_entity_is_isolated() {
    let harness = Harness::new(
        ScriptedSource::default()
            .with_pages("E1", patent_pages(2, 30))
            .with_failure("E2", 404)
            .with_pages("E3", patent_pages(4, 30))
            .with_pages("E4", patent_pages(1, 30)),
        &["E1", "E2", "E3", "E4"],
    );

    let report = harness.orchestrator().run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.total_entities, 4);
    assert_eq!(report.stats.succeeded, 3);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.total_records, 7);

    assert!(harness
        .audit
        .last_checked("E2", SourceType::Patent)
        .unwrap()
        .is_none());
    for id in ["E1", "E3", "E4"] {
        assert!(harness
            .audit
            .last_checked(id, SourceType::Patent)
            .unwrap()
            .is_some());
    }

    let errors = harness.audit.error_log(SourceType::Patent).unwrap();
    assert!(errors
        .iter()
        .any(|e| e.location.contains("E2") && e.message.contains("404")));
}

#[tokio::test]
async fn test_empty_results_twice_leave_two_zero_count_rows_and_sentinel() {
    let harness = Harness::new(ScriptedSource::default(), &["E1"]);

    let first = harness.orchestrator().run().await;
    let second = harness.orchestrator().run().await;

    assert_eq!(first.stats.succeeded, 1);
    assert_eq!(second.stats.succeeded, 1);

    let counts = harness.audit.count_log("E1", SourceType::Patent).unwrap();
    assert_eq!(counts.len(), 2);
    assert!(counts.iter().all(|r| r.count == 0));

    let docs = harness
        .documents
        .documents_for(SourceType::Patent, "E1")
        .unwrap();
    assert!(!docs.is_empty());
    assert!(docs.iter().all(|d| d.is_sentinel()));
}

#[tokio::test]
async fn test_duplicate_first_candidate_still_marks_entity_checked() {
    let harness = Harness::new(
        ScriptedSource::default().with_pages("E1", vec![vec![patent_candidate(1)]]),
        &["E1"],
    );
    store_patent(&harness.documents, "E1", 1).await;

    let report = harness.orchestrator().run().await;

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.total_records, 0);
    assert_eq!(report.stats.stopped_at_duplicate, 1);
    let counts = harness.audit.count_log("E1", SourceType::Patent).unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].count, 0);
}

#[tokio::test]
async fn test_setup_failure_aborts_and_still_finalizes() {
    let source = ScriptedSource {
        fail_setup: true,
        ..ScriptedSource::default()
    }
    .with_pages("E1", patent_pages(3, 30));
    let harness = Harness::new(source, &["E1"]);

    let report = harness.orchestrator().with_workers(2).run().await;

    assert!(report.outcome.is_aborted());
    assert_eq!(report.stats.succeeded + report.stats.failed, 0);
    assert!(harness
        .audit
        .count_log("E1", SourceType::Patent)
        .unwrap()
        .is_empty());

    // The session that failed setup is still released
    assert_eq!(harness.source.created.load(Ordering::SeqCst), 1);
    assert_eq!(harness.source.closed.load(Ordering::SeqCst), 1);
    assert_eq!(harness.notifier.count(), 1);
    assert!(harness.notifier.last_subject().unwrap().contains("aborted"));
}

#[tokio::test]
async fn test_empty_entity_list_is_nothing_to_do() {
    let harness = Harness::new(ScriptedSource::default(), &[]);

    let report = harness.orchestrator().run().await;

    assert_eq!(report.outcome, RunOutcome::NothingToDo);
    assert_eq!(report.stats.total_entities, 0);
    assert_eq!(harness.notifier.count(), 1);
}

#[tokio::test]
async fn test_failed_notification_does_not_change_outcome() {
    let mut harness = Harness::new(
        ScriptedSource::default().with_pages("E1", patent_pages(2, 30)),
        &["E1"],
    );
    harness.notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    });

    let report = harness.orchestrator().run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(harness.notifier.count(), 1);
}

#[tokio::test]
async fn test_cancelled_run_is_interrupted_between_entities() {
    let harness = Harness::new(
        ScriptedSource::default(),
        &["E1", "E2", "E3"],
    );
    let token = CancellationToken::new();
    token.cancel();

    let report = harness
        .orchestrator()
        .with_cancellation(token)
        .run()
        .await;

    assert_eq!(report.outcome, RunOutcome::Interrupted { remaining: 3 });
    assert_eq!(report.stats.unprocessed(), 3);
    assert_eq!(harness.source.closed.load(Ordering::SeqCst), 1);
    assert_eq!(harness.notifier.count(), 1);
}

#[tokio::test]
async fn test_workers_each_own_a_session() {
    let ids: Vec<String> = (1..=10).map(|i| format!("E{:02}", i)).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let mut source = ScriptedSource::default();
    for id in &ids {
        source = source.with_pages(id, patent_pages(3, 2));
    }
    let harness = Harness::new(source, &id_refs);

    let report = harness.orchestrator().with_workers(3).run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.succeeded, 10);
    assert_eq!(report.stats.total_records, 30);
    assert_eq!(harness.source.created.load(Ordering::SeqCst), 3);
    assert_eq!(harness.source.closed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausted_credential_pool_fails_only_that_entity() {
    let pool = CredentialPool::new(vec![
        Credential {
            id: "k1".to_string(),
            secret: "s1".to_string(),
        },
        Credential {
            id: "k2".to_string(),
            secret: "s2".to_string(),
        },
    ]);
    let source = ScriptedSource {
        pool: Some(Arc::new(pool)),
        ..ScriptedSource::default()
    }
    .with_failure("E1", 429)
    .with_pages("E2", patent_pages(2, 30));
    let harness = Harness::new(source, &["E1", "E2"]);

    let report = harness.orchestrator().run().await;

    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.succeeded, 1);

    let errors = harness.audit.error_log(SourceType::Patent).unwrap();
    // Two rate-limited attempts, then the entity failure
    assert_eq!(
        errors
            .iter()
            .filter(|e| e.message.starts_with("attempt"))
            .count(),
        2
    );
    assert!(errors.iter().any(|e| e.message.contains("exhausted")));
}

#[tokio::test]
async fn test_unregistered_source_aborts_with_notification() {
    let config: Config = toml::from_str(
        r#"
        [storage]
        audit-database = "audit.db"
        documents-database = "docs.db"
        "#,
    )
    .unwrap();
    let audit = audit_with_entities(&["E1"]);
    let documents = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let notifier = Arc::new(RecordingNotifier::default());

    let report = orchestrator_for(
        &config,
        &SessionRegistry::new(),
        SourceType::News,
        audit.clone(),
        audit.clone(),
        documents,
        notifier.clone(),
    )
    .run()
    .await;

    assert!(report.outcome.is_aborted());
    assert_eq!(notifier.count(), 1);
    let errors = audit.error_log(SourceType::News).unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("no crawl session registered"));
}

#[tokio::test]
async fn test_unopenable_audit_database_still_notifies_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("audit.db");
    let reason = match open_audit_store(&path) {
        Ok(_) => panic!("audit database under a missing directory opened"),
        Err(e) => format!("failed to open audit database: {}", e),
    };
    let notifier = RecordingNotifier::default();

    let report = abort_before_run(SourceType::Patent, reason, &notifier, Some("abc123")).await;

    assert!(report.outcome.is_aborted());
    assert_eq!(report.stats.total_entities, 0);
    assert_eq!(notifier.count(), 1);
    assert!(notifier.last_subject().unwrap().contains("aborted"));
    let body = notifier.sent.lock().unwrap()[0].1.clone();
    assert!(body.contains("failed to open audit database"));
    assert!(body.contains("Config hash: abc123"));
}
