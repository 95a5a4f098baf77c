//! Crawl session over a paged JSON API
//!
//! The API is described by a `[[source]]` table: where the search endpoint
//! lives, which query parameters carry the search term and paging, and JSON
//! pointers locating the hit count, the item array and each item's natural
//! key. Items are either stored as-is or expanded through a detail endpoint.

use crate::config::{QueryField, SourceConfig};
use crate::crawler::credentials::CredentialPool;
use crate::crawler::fetcher::fetch_json;
use crate::crawler::session::CrawlSession;
use crate::model::{Candidate, Entity, Record};
use crate::{HarvestError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Paging state of the current search
#[derive(Debug, Default)]
struct Cursor {
    query: Option<String>,
    page: u32,
    total: u64,
    fetched: u64,
    exhausted: bool,

    /// First page, fetched by `search` and handed out by the first `next_page`
    cached: Option<Vec<Candidate>>,
}

/// JSON API crawl session
pub struct ApiSession {
    client: Client,
    config: SourceConfig,
    pool: Option<Arc<CredentialPool>>,
    cursor: Mutex<Cursor>,
}

impl ApiSession {
    pub fn new(client: Client, config: SourceConfig, pool: Option<Arc<CredentialPool>>) -> Self {
        Self {
            client,
            config,
            pool,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    fn cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Search term for `entity` according to the configured query field
    fn query_for(&self, entity: &Entity) -> Result<String> {
        let query = match self.config.query_field {
            QueryField::Id => Some(entity.id.clone()),
            QueryField::DisplayName => Some(entity.clean_name()),
            QueryField::SecondaryName => entity.clean_secondary_name(),
        };

        query.filter(|q| !q.is_empty()).ok_or_else(|| {
            HarvestError::Extraction(format!(
                "entity {} has no usable {:?} to search by",
                entity.id, self.config.query_field
            ))
        })
    }

    fn with_credentials(&self, mut request: RequestBuilder) -> Result<RequestBuilder> {
        if let Some(pool) = &self.pool {
            let credential = pool.current()?;
            if let Some(header) = &self.config.credential_id_header {
                request = request.header(header.as_str(), credential.id);
            }
            if let Some(header) = &self.config.credential_secret_header {
                request = request.header(header.as_str(), credential.secret);
            }
        }
        Ok(request)
    }

    async fn fetch_page(&self, query: &str, page: u32) -> Result<(u64, Vec<Candidate>)> {
        let request = self.client.get(&self.config.endpoint).query(&[
            (self.config.query_param.as_str(), query.to_string()),
            (self.config.page_param.as_str(), page.to_string()),
            (self.config.page_size_param.as_str(), self.config.page_size.to_string()),
        ]);
        let body = fetch_json(self.with_credentials(request)?, &self.config.endpoint).await?;

        let total = body
            .pointer(&self.config.total_pointer)
            .and_then(read_count)
            .ok_or_else(|| {
                HarvestError::Extraction(format!(
                    "no result count at {} in {} response",
                    self.config.total_pointer, self.config.source_type
                ))
            })?;

        let items = match body.pointer(&self.config.items_pointer) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            // Some APIs collapse a single-item list into the item itself
            Some(item) => vec![item.clone()],
        };

        let candidates = items
            .into_iter()
            .map(|item| {
                let key = self
                    .config
                    .key_pointer
                    .as_deref()
                    .and_then(|pointer| item.pointer(pointer))
                    .and_then(read_key);
                Candidate::new(key, item)
            })
            .collect();

        Ok((total, candidates))
    }
}

/// Counts arrive as numbers or numeric strings
fn read_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn read_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl CrawlSession for ApiSession {
    async fn search(&self, entity: &Entity) -> Result<()> {
        let query = self.query_for(entity)?;
        let (total, first_page) = self.fetch_page(&query, 1).await?;
        debug!(
            "{} search for '{}': {} results",
            self.config.source_type, query, total
        );

        let mut cursor = self.cursor();
        *cursor = Cursor {
            query: Some(query),
            page: 1,
            total,
            fetched: first_page.len() as u64,
            exhausted: first_page.is_empty(),
            cached: Some(first_page),
        };
        Ok(())
    }

    async fn total_count(&self) -> Result<u64> {
        let cursor = self.cursor();
        if cursor.query.is_none() {
            return Err(HarvestError::Extraction(
                "total_count called before search".to_string(),
            ));
        }
        Ok(cursor.total)
    }

    async fn next_page(&self) -> Result<Vec<Candidate>> {
        let (query, next) = {
            let mut cursor = self.cursor();
            if let Some(page) = cursor.cached.take() {
                return Ok(page);
            }
            if cursor.exhausted || cursor.fetched >= cursor.total {
                return Ok(Vec::new());
            }
            match cursor.query.clone() {
                Some(query) => (query, cursor.page + 1),
                None => return Ok(Vec::new()),
            }
        };

        let (_, candidates) = self.fetch_page(&query, next).await?;

        let mut cursor = self.cursor();
        cursor.page = next;
        cursor.fetched += candidates.len() as u64;
        cursor.exhausted = candidates.is_empty();
        Ok(candidates)
    }

    fn has_more_pages(&self) -> bool {
        let cursor = self.cursor();
        cursor.cached.is_some() || (!cursor.exhausted && cursor.fetched < cursor.total)
    }

    async fn extract(&self, candidate: &Candidate) -> Result<Record> {
        let mut record = match &self.config.detail_endpoint {
            None => Record::try_from(candidate.payload.clone()).map_err(|_| {
                HarvestError::Extraction("list item is not a JSON object".to_string())
            })?,
            Some(detail) => {
                let key = candidate.natural_key.as_deref().ok_or_else(|| {
                    HarvestError::Extraction(
                        "candidate has no key for the detail request".to_string(),
                    )
                })?;
                let url = detail.replace("{key}", key);

                let body = fetch_json(self.with_credentials(self.client.get(&url))?, &url).await?;
                Record::try_from(body).map_err(|_| {
                    HarvestError::Extraction(format!(
                        "detail response for {} is not a JSON object",
                        key
                    ))
                })?
            }
        };

        // Later runs look the key up under the source's registered field name
        if let (Some(field), Some(key)) = (
            self.config.source_type.natural_key_field(),
            candidate.natural_key.as_deref(),
        ) {
            if record.get(field).is_none() {
                record.insert(field, key);
            }
        }

        Ok(record)
    }

    fn credential_pool(&self) -> Option<Arc<CredentialPool>> {
        self.pool.clone()
    }
}
