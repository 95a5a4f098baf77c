//! JSON API sessions against a mock upstream

use crate::common::{audit_with_entities, fast_retry, store_patent, RecordingNotifier};
use entity_harvest::config::{CredentialEntry, QueryField, SourceConfig};
use entity_harvest::crawler::{ApiSessionProvider, SessionProvider};
use entity_harvest::storage::{AuditStore, SqliteDocumentStore};
use entity_harvest::{Entity, HarvestError, Orchestrator, RunOutcome, SourceType};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn patent_source(base_url: &str) -> SourceConfig {
    SourceConfig {
        source_type: SourceType::Patent,
        endpoint: format!("{}/search", base_url),
        query_param: "applicant".to_string(),
        query_field: QueryField::DisplayName,
        page_param: "page".to_string(),
        page_size_param: "rows".to_string(),
        page_size: 30,
        total_pointer: "/response/total".to_string(),
        items_pointer: "/response/items".to_string(),
        key_pointer: Some("/applicationNumber".to_string()),
        detail_endpoint: None,
        credential_id_header: None,
        credential_secret_header: None,
        credentials: vec![],
    }
}

fn page_body(total: usize, numbers: std::ops::RangeInclusive<usize>) -> Value {
    let items: Vec<Value> = numbers
        .map(|n| json!({ "applicationNumber": format!("A-{}", n), "title": format!("Invention {}", n) }))
        .collect();
    json!({ "response": { "total": total, "items": items } })
}

async fn mount_page(server: &MockServer, page: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("applicant", "Acme"))
        .and(query_param("page", page))
        .and(query_param("rows", "30"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_api_session_pages_through_results() {
    let server = MockServer::start().await;
    mount_page(&server, "1", page_body(45, 1..=30)).await;
    mount_page(&server, "2", page_body(45, 31..=45)).await;

    let provider = ApiSessionProvider::new(Client::new(), patent_source(&server.uri()));
    let session = provider.create_session().unwrap();
    let entity = Entity::new("E1", "(주)Acme");

    session.search(&entity).await.unwrap();
    assert_eq!(session.total_count().await.unwrap(), 45);

    let mut keys = Vec::new();
    while session.has_more_pages() {
        let page = session.next_page().await.unwrap();
        if page.is_empty() {
            break;
        }
        keys.extend(page.into_iter().filter_map(|c| c.natural_key));
    }

    assert_eq!(keys.len(), 45);
    assert_eq!(keys[0], "A-1");
    assert_eq!(keys[44], "A-45");
    assert!(!session.has_more_pages());
}

#[tokio::test]
async fn test_api_run_stops_at_known_application_number() {
    let server = MockServer::start().await;
    mount_page(&server, "1", page_body(45, 1..=30)).await;
    mount_page(&server, "2", page_body(45, 31..=45)).await;

    let audit = Arc::new(entity_harvest::storage::SqliteAuditStore::open_in_memory().unwrap());
    audit
        .upsert_entity(&Entity::new("E1", "(주)Acme(Holdings)"))
        .unwrap();
    let documents = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    store_patent(&documents, "E1", 37).await;

    let (retry, condition) = fast_retry();
    let report = Orchestrator::new(
        SourceType::Patent,
        Arc::new(ApiSessionProvider::new(
            Client::new(),
            patent_source(&server.uri()),
        )),
        audit.clone(),
        audit.clone(),
        documents.clone(),
    )
    .with_retry(retry, condition)
    .with_notifier(Arc::new(RecordingNotifier::default()))
    .run()
    .await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.total_records, 36);
    assert_eq!(report.stats.stopped_at_duplicate, 1);

    let docs = documents.documents_for(SourceType::Patent, "E1").unwrap();
    let last = docs.last().and_then(|d| d.data.as_ref()).unwrap();
    assert_eq!(last.get("applicationNumber"), Some(&json!("A-36")));
}

#[tokio::test]
async fn test_detail_endpoint_supplies_records() {
    let server = MockServer::start().await;
    mount_page(&server, "1", page_body(2, 1..=2)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/detail/A-\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "application_number": "from-detail",
            "claims": 12
        })))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = patent_source(&server.uri());
    config.detail_endpoint = Some(format!("{}/detail/{{key}}", server.uri()));
    let session = ApiSessionProvider::new(Client::new(), config)
        .create_session()
        .unwrap();

    session.search(&Entity::new("E1", "Acme")).await.unwrap();
    let page = session.next_page().await.unwrap();
    assert_eq!(page.len(), 2);

    for candidate in &page {
        let record = session.extract(candidate).await.unwrap();
        assert_eq!(record.get("claims"), Some(&json!(12)));
    }
}

#[tokio::test]
async fn test_non_object_item_is_extraction_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "total": 1, "items": ["just a string"] }
        })))
        .mount(&server)
        .await;

    let session = ApiSessionProvider::new(Client::new(), patent_source(&server.uri()))
        .create_session()
        .unwrap();
    session.search(&Entity::new("E1", "Acme")).await.unwrap();
    let page = session.next_page().await.unwrap();

    assert!(matches!(
        session.extract(&page[0]).await,
        Err(HarvestError::Extraction(_))
    ));
}

#[tokio::test]
async fn test_rate_limited_credential_is_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("X-Api-Key", "k1"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("X-Api-Key", "k2"))
        .and(header("X-Api-Secret", "s2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(1, 1..=1)))
        .mount(&server)
        .await;

    let mut config = patent_source(&server.uri());
    config.credential_id_header = Some("X-Api-Key".to_string());
    config.credential_secret_header = Some("X-Api-Secret".to_string());
    config.credentials = vec![
        CredentialEntry {
            id: "k1".to_string(),
            secret: "s1".to_string(),
        },
        CredentialEntry {
            id: "k2".to_string(),
            secret: "s2".to_string(),
        },
    ];

    let audit = audit_with_entities(&["E1"]);
    let documents = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let (retry, condition) = fast_retry();

    let report = Orchestrator::new(
        SourceType::Patent,
        Arc::new(ApiSessionProvider::new(Client::new(), config)),
        audit.clone(),
        audit.clone(),
        documents,
    )
    .with_retry(retry, condition)
    .with_notifier(Arc::new(RecordingNotifier::default()))
    .run()
    .await;

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.total_records, 1);

    // One audit row for the rate-limited attempt
    let errors = audit.error_log(SourceType::Patent).unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("429"));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(0, 1..=0)))
        .mount(&server)
        .await;

    let audit = audit_with_entities(&["E1"]);
    let documents = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
    let (retry, condition) = fast_retry();

    let report = Orchestrator::new(
        SourceType::Patent,
        Arc::new(ApiSessionProvider::new(
            Client::new(),
            patent_source(&server.uri()),
        )),
        audit.clone(),
        audit.clone(),
        documents.clone(),
    )
    .with_retry(retry, condition)
    .with_notifier(Arc::new(RecordingNotifier::default()))
    .run()
    .await;

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.total_records, 0);
    assert_eq!(audit.error_log(SourceType::Patent).unwrap().len(), 2);
    let docs = documents.documents_for(SourceType::Patent, "E1").unwrap();
    assert_eq!(docs.len(), 1);
    assert!(docs[0].is_sentinel());
}
