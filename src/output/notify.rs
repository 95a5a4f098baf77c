//! Completion notification channels

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

/// Delivers the end-of-run summary
///
/// `send` reports delivery as a bool and never fails the run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> bool;
}

/// Writes the notification to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> bool {
        info!("{}\n{}", subject, body);
        true
    }
}

/// POSTs `{"subject": .., "body": ..}` to a webhook
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, body: &str) -> bool {
        let payload = json!({ "subject": subject, "body": body });

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(
                    "Notification webhook {} answered {}",
                    self.url,
                    response.status()
                );
                false
            }
            Err(e) => {
                warn!("Notification webhook {} unreachable: {}", self.url, e);
                false
            }
        }
    }
}
