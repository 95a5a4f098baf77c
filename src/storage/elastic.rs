//! Elasticsearch document store
//!
//! Bulk-indexes stamped documents and answers natural-key lookups with an
//! exact `term` count query.
//!
//! `term` matches unanalyzed values only, so the index must map
//! `source_type`, `entity_id` and each `data.<natural key>` field as
//! `keyword`. Under the default dynamic text mapping a value such as
//! `10-2020-0001` is tokenized and never matches, and duplicates go unseen.

use crate::model::SourceType;
use crate::storage::traits::{BulkOutcome, Document, DocumentStore, StorageError, StorageResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::debug;

/// Basic-auth pair for the cluster
#[derive(Debug, Clone)]
pub struct ElasticCredentials {
    pub username: String,
    pub password: String,
}

/// Elasticsearch document store backend
pub struct ElasticDocumentStore {
    client: Client,
    base_url: String,
    index: String,
    credentials: Option<ElasticCredentials>,
}

impl ElasticDocumentStore {
    pub fn new(client: Client, base_url: &str, index: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: ElasticCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(c) => request.basic_auth(&c.username, Some(&c.password)),
            None => request,
        }
    }

    async fn count(&self, filters: Vec<Value>) -> StorageResult<u64> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let query = json!({
            "size": 0,
            "track_total_hits": true,
            "query": { "bool": { "must": filters } }
        });

        let response = self
            .authorize(self.client.post(&url).json(&query))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Remote(format!(
                "search returned {}: {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;
        body.pointer("/hits/total/value")
            .and_then(Value::as_u64)
            .ok_or_else(|| StorageError::Remote("search response has no hits.total.value".into()))
    }
}

/// Builds the NDJSON body for a `_bulk` request
fn bulk_body(index: &str, documents: &[Document]) -> StorageResult<String> {
    let mut body = String::new();
    let action = serde_json::to_string(&json!({ "index": { "_index": index } }))?;

    for document in documents {
        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(document)?);
        body.push('\n');
    }

    Ok(body)
}

/// Tallies per-item results of a `_bulk` response
fn bulk_outcome(response: &Value) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();

    let items = response
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for item in items {
        let result = item.get("index").or_else(|| item.get("create"));
        match result.and_then(|r| r.get("error")) {
            Some(error) => {
                outcome.failed += 1;
                outcome.errors.push(
                    error
                        .get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string()),
                );
            }
            None => outcome.indexed += 1,
        }
    }

    outcome
}

#[async_trait]
impl DocumentStore for ElasticDocumentStore {
    async fn insert_documents(&self, documents: &[Document]) -> StorageResult<BulkOutcome> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let url = format!("{}/_bulk", self.base_url);
        let body = bulk_body(&self.index, documents)?;

        let response = self
            .authorize(
                self.client
                    .post(&url)
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Remote(format!(
                "bulk insert returned {}: {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;
        let outcome = bulk_outcome(&body);
        debug!(
            "Bulk insert into {}: {} indexed, {} failed",
            self.index, outcome.indexed, outcome.failed
        );
        Ok(outcome)
    }

    async fn count_matching(
        &self,
        source: SourceType,
        entity_id: &str,
        field: &str,
        value: &str,
    ) -> StorageResult<u64> {
        let key_field = format!("data.{}", field);
        self.count(vec![
            json!({ "term": { "source_type": source.as_str() } }),
            json!({ "term": { "entity_id": entity_id } }),
            json!({ "term": { key_field: value } }),
        ])
        .await
    }
}
