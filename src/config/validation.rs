use crate::config::types::{
    Config, DocumentBackend, HttpConfig, NotificationConfig, NotificationKind, RetryConfig,
    RunConfig, SourceConfig, StorageConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_retry_config(&config.retry)?;
    validate_http_config(&config.http)?;
    validate_storage_config(&config.storage)?;
    validate_run_config(&config.run)?;
    validate_notification_config(&config.notification)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 || config.max_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be between 1 and 20, got {}",
            config.max_retries
        )));
    }

    if config.multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "multiplier must be >= 1.0, got {}",
            config.multiplier
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms ({}) must be >= base_delay_ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    if !(0.0..=1.0).contains(&config.jitter_ratio) {
        return Err(ConfigError::Validation(format!(
            "jitter_ratio must be between 0.0 and 1.0, got {}",
            config.jitter_ratio
        )));
    }

    for status in config
        .retryable_statuses
        .iter()
        .chain(&config.rate_limit_statuses)
    {
        if !(100..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "{} is not an HTTP status code",
                status
            )));
        }
    }

    // Rotation only happens on attempts that are retried in the first place
    if let Some(status) = config
        .rate_limit_statuses
        .iter()
        .find(|s| !config.retryable_statuses.contains(s))
    {
        return Err(ConfigError::Validation(format!(
            "rate-limit status {} must also be listed in retryable_statuses",
            status
        )));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    if config.connect_timeout_secs > config.request_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs ({}) cannot exceed request_timeout_secs ({})",
            config.connect_timeout_secs, config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.audit_database.is_empty() {
        return Err(ConfigError::Validation(
            "audit_database cannot be empty".to_string(),
        ));
    }

    if config.operator_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "operator_id cannot be empty".to_string(),
        ));
    }

    match config.document_store {
        DocumentBackend::Sqlite => {
            if config.documents_database.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::Validation(
                    "documents_database is required for the sqlite document store".to_string(),
                ));
            }
        }
        DocumentBackend::Elasticsearch => {
            let url = config.elasticsearch_url.as_deref().ok_or_else(|| {
                ConfigError::Validation(
                    "elasticsearch_url is required for the elasticsearch document store"
                        .to_string(),
                )
            })?;
            validate_http_url("elasticsearch_url", url)?;

            if config.elasticsearch_index.is_empty() {
                return Err(ConfigError::Validation(
                    "elasticsearch_index cannot be empty".to_string(),
                ));
            }

            if config.elasticsearch_username.is_some() != config.elasticsearch_password.is_some()
            {
                return Err(ConfigError::Validation(
                    "elasticsearch_username and elasticsearch_password must be set together"
                        .to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Validates run configuration
fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 32 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 32, got {}",
            config.workers
        )));
    }
    Ok(())
}

/// Validates notification configuration
fn validate_notification_config(config: &NotificationConfig) -> Result<(), ConfigError> {
    if config.kind == NotificationKind::Webhook {
        let url = config.webhook_url.as_deref().ok_or_else(|| {
            ConfigError::Validation("webhook_url is required for webhook notifications".to_string())
        })?;
        validate_http_url("webhook_url", url)?;
    }
    Ok(())
}

/// Validates the per-source API tables
fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in sources {
        if !seen.insert(source.source_type) {
            return Err(ConfigError::Validation(format!(
                "source '{}' is configured more than once",
                source.source_type
            )));
        }

        validate_http_url("endpoint", &source.endpoint)?;

        if let Some(detail) = &source.detail_endpoint {
            if !detail.contains("{key}") {
                return Err(ConfigError::Validation(format!(
                    "detail_endpoint for '{}' must contain a {{key}} placeholder",
                    source.source_type
                )));
            }
            validate_http_url("detail_endpoint", &detail.replace("{key}", "key"))?;

            if source.key_pointer.is_none() {
                return Err(ConfigError::Validation(format!(
                    "detail_endpoint for '{}' requires key_pointer",
                    source.source_type
                )));
            }
        }

        if source.query_param.is_empty() {
            return Err(ConfigError::Validation(format!(
                "query_param for '{}' cannot be empty",
                source.source_type
            )));
        }

        if source.page_size < 1 || source.page_size > 1000 {
            return Err(ConfigError::Validation(format!(
                "page_size for '{}' must be between 1 and 1000, got {}",
                source.source_type, source.page_size
            )));
        }

        for (name, pointer) in [
            ("total_pointer", Some(&source.total_pointer)),
            ("items_pointer", Some(&source.items_pointer)),
            ("key_pointer", source.key_pointer.as_ref()),
        ] {
            if let Some(pointer) = pointer {
                validate_json_pointer(name, pointer)?;
            }
        }

        if !source.credentials.is_empty() && source.credential_id_header.is_none() {
            return Err(ConfigError::Validation(format!(
                "source '{}' has credentials but no credential_id_header",
                source.source_type
            )));
        }
    }

    Ok(())
}

/// Validates an absolute http(s) URL
fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}

/// JSON pointers are either empty (whole document) or start with '/'
fn validate_json_pointer(name: &str, pointer: &str) -> Result<(), ConfigError> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must be a JSON pointer starting with '/'",
            name, pointer
        )));
    }
    Ok(())
}
