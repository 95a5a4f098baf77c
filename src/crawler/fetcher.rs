//! HTTP fetcher implementation
//!
//! This module handles the HTTP side of API sessions:
//! - Building the shared HTTP client with the configured user agent and timeouts
//! - Turning non-success responses into status errors the retry policy can classify
//! - Decoding JSON bodies

use crate::config::HttpConfig;
use crate::{HarvestError, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use entity_harvest::config::HttpConfig;
/// use entity_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps a non-success status to `HarvestError::Status`
pub fn ensure_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(HarvestError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

/// Sends `request` and decodes the JSON body
///
/// Transport failures keep the reqwest error so the retry policy can tell
/// timeouts and refused connections apart from bad responses.
pub async fn fetch_json(request: RequestBuilder, url: &str) -> Result<Value> {
    let response = request.send().await.map_err(|e| HarvestError::Http {
        url: url.to_string(),
        source: e,
    })?;

    let response = ensure_status(response)?;

    response.json::<Value>().await.map_err(|e| HarvestError::Http {
        url: url.to_string(),
        source: e,
    })
}
