use crate::model::SourceType;
use serde::Deserialize;

/// Main configuration structure for Entity-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Returns the source table for a source type, if configured
    pub fn source(&self, source: SourceType) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.source_type == source)
    }
}

/// Retry and backoff behavior for network-bound operations
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay after the first failed attempt (milliseconds)
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Growth factor applied per further failed attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound on a single backoff delay before jitter (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter upper bound as a fraction of the computed delay
    #[serde(rename = "jitter-ratio", default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// HTTP statuses that make an attempt count as failed and retryable
    #[serde(rename = "retryable-statuses", default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,

    /// HTTP statuses that trigger credential rotation
    #[serde(rename = "rate-limit-statuses", default = "default_rate_limit_statuses")]
    pub rate_limit_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
            retryable_statuses: default_retryable_statuses(),
            rate_limit_statuses: default_rate_limit_statuses(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Hard limit for one request (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Which backend holds collected documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentBackend {
    Sqlite,
    Elasticsearch,
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite audit database (entities, check/count/error logs)
    #[serde(rename = "audit-database")]
    pub audit_database: String,

    #[serde(rename = "document-store", default = "default_document_backend")]
    pub document_store: DocumentBackend,

    /// Path to the SQLite document database (sqlite backend)
    #[serde(rename = "documents-database", default)]
    pub documents_database: Option<String>,

    #[serde(rename = "elasticsearch-url", default)]
    pub elasticsearch_url: Option<String>,

    #[serde(rename = "elasticsearch-index", default = "default_index")]
    pub elasticsearch_index: String,

    #[serde(rename = "elasticsearch-username", default)]
    pub elasticsearch_username: Option<String>,

    #[serde(rename = "elasticsearch-password", default)]
    pub elasticsearch_password: Option<String>,

    /// Identifier stamped on every written document
    #[serde(rename = "operator-id", default = "default_operator_id")]
    pub operator_id: String,
}

/// Run-level settings
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Number of entities processed concurrently, each with its own session
    #[serde(default = "default_workers")]
    pub workers: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Log,
    Webhook,
}

/// Completion notification channel
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_kind")]
    pub kind: NotificationKind,

    #[serde(rename = "webhook-url", default)]
    pub webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            kind: default_notification_kind(),
            webhook_url: None,
        }
    }
}

/// Entity field used as the search query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryField {
    Id,
    DisplayName,
    SecondaryName,
}

/// A paged JSON API serving one source type
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: SourceType,

    /// Search endpoint returning one page of results
    pub endpoint: String,

    #[serde(rename = "query-param")]
    pub query_param: String,

    #[serde(rename = "query-field", default = "default_query_field")]
    pub query_field: QueryField,

    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    #[serde(rename = "page-size-param", default = "default_page_size_param")]
    pub page_size_param: String,

    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// JSON pointer to the total hit count in a search response
    #[serde(rename = "total-pointer")]
    pub total_pointer: String,

    /// JSON pointer to the array of items in a search response
    #[serde(rename = "items-pointer")]
    pub items_pointer: String,

    /// JSON pointer to the natural key inside one item
    #[serde(rename = "key-pointer", default)]
    pub key_pointer: Option<String>,

    /// Detail endpoint with a `{key}` placeholder; items are stored as-is without it
    #[serde(rename = "detail-endpoint", default)]
    pub detail_endpoint: Option<String>,

    #[serde(rename = "credential-id-header", default)]
    pub credential_id_header: Option<String>,

    #[serde(rename = "credential-secret-header", default)]
    pub credential_secret_header: Option<String>,

    #[serde(default)]
    pub credentials: Vec<CredentialEntry>,
}

/// One API key pair in a credential pool
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialEntry {
    pub id: String,
    pub secret: String,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_ratio() -> f64 {
    0.1
}

fn default_retryable_statuses() -> Vec<u16> {
    vec![429, 500, 502, 503, 504]
}

fn default_rate_limit_statuses() -> Vec<u16> {
    vec![429]
}

fn default_user_agent() -> String {
    format!("entity-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    20
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_document_backend() -> DocumentBackend {
    DocumentBackend::Sqlite
}

fn default_index() -> String {
    "source_data".to_string()
}

fn default_operator_id() -> String {
    "autoSystem".to_string()
}

fn default_workers() -> u32 {
    1
}

fn default_notification_kind() -> NotificationKind {
    NotificationKind::Log
}

fn default_query_field() -> QueryField {
    QueryField::DisplayName
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_page_size_param() -> String {
    "size".to_string()
}

fn default_page_size() -> u32 {
    30
}
