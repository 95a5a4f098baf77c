//! Session registry keyed by source type

use crate::config::{Config, SourceConfig};
use crate::crawler::api_session::ApiSession;
use crate::crawler::credentials::CredentialPool;
use crate::crawler::session::CrawlSession;
use crate::model::SourceType;
use crate::{HarvestError, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;

/// Creates one fresh crawl session per worker
pub trait SessionProvider: Send + Sync {
    fn create_session(&self) -> Result<Box<dyn CrawlSession>>;
}

impl<F> SessionProvider for F
where
    F: Fn() -> Result<Box<dyn CrawlSession>> + Send + Sync,
{
    fn create_session(&self) -> Result<Box<dyn CrawlSession>> {
        self()
    }
}

/// Builds `ApiSession`s for one `[[source]]` table
///
/// All sessions share the source's credential pool.
pub struct ApiSessionProvider {
    client: Client,
    config: SourceConfig,
    pool: Option<Arc<CredentialPool>>,
}

impl ApiSessionProvider {
    pub fn new(client: Client, config: SourceConfig) -> Self {
        let pool = CredentialPool::from_config(&config.credentials).map(Arc::new);
        Self {
            client,
            config,
            pool,
        }
    }
}

impl SessionProvider for ApiSessionProvider {
    fn create_session(&self) -> Result<Box<dyn CrawlSession>> {
        Ok(Box::new(ApiSession::new(
            self.client.clone(),
            self.config.clone(),
            self.pool.clone(),
        )))
    }
}

/// Maps each source type to the provider of its sessions
#[derive(Default)]
pub struct SessionRegistry {
    providers: HashMap<SourceType, Arc<dyn SessionProvider>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an API session provider for every configured source
    pub fn from_config(config: &Config, client: &Client) -> Self {
        let mut registry = Self::new();
        for source in &config.sources {
            registry.register(
                source.source_type,
                Arc::new(ApiSessionProvider::new(client.clone(), source.clone())),
            );
        }
        registry
    }

    /// Adds or replaces the provider for `source`
    pub fn register(&mut self, source: SourceType, provider: Arc<dyn SessionProvider>) {
        self.providers.insert(source, provider);
    }

    pub fn contains(&self, source: SourceType) -> bool {
        self.providers.contains_key(&source)
    }

    /// Registered sources in declaration order of `SourceType`
    pub fn sources(&self) -> Vec<SourceType> {
        SourceType::ALL
            .into_iter()
            .filter(|s| self.providers.contains_key(s))
            .collect()
    }

    pub fn provider(&self, source: SourceType) -> Result<Arc<dyn SessionProvider>> {
        self.providers.get(&source).cloned().ok_or_else(|| {
            HarvestError::Setup(format!("no crawl session registered for '{}'", source))
        })
    }
}
