//! Output module for run reports and notifications
//!
//! This module handles:
//! - Run statistics and the printed run report
//! - The per-source collection summary read from the audit store
//! - Completion notifications

mod notify;
pub mod stats;

pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use stats::{
    format_elapsed, print_collection_summary, print_run_report, RunOutcome, RunReport, RunStats,
};

use crate::config::{NotificationConfig, NotificationKind};
use reqwest::Client;
use std::fmt::Write;
use std::sync::Arc;

/// Builds the notifier selected by the configuration
pub fn build_notifier(config: &NotificationConfig, client: &Client) -> Arc<dyn Notifier> {
    match (config.kind, &config.webhook_url) {
        (NotificationKind::Webhook, Some(url)) => {
            Arc::new(WebhookNotifier::new(client.clone(), url.clone()))
        }
        _ => Arc::new(LogNotifier),
    }
}

/// Subject line of the completion notification
pub fn completion_subject(report: &RunReport) -> String {
    format!(
        "[{}] collection finished: {}",
        report.source, report.outcome
    )
}

/// Body of the completion notification
pub fn completion_body(report: &RunReport, config_hash: Option<&str>) -> String {
    let stats = &report.stats;
    let message = match &report.outcome {
        stats::RunOutcome::Completed if stats.failed == 0 => {
            "All entities were processed successfully.".to_string()
        }
        stats::RunOutcome::Completed => format!(
            "Run completed with {} failed entities; see the error log.",
            stats.failed
        ),
        stats::RunOutcome::NothingToDo => "No entities were eligible for collection.".to_string(),
        stats::RunOutcome::Interrupted { remaining } => format!(
            "Run was interrupted with {} entities not processed.",
            remaining
        ),
        stats::RunOutcome::Aborted { reason } => format!("Run aborted: {}", reason),
    };

    let mut body = String::new();
    let _ = writeln!(body, "{}", message);
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Started: {}",
        stats.start_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(body, "Elapsed: {}", format_elapsed(report.elapsed));
    let _ = writeln!(body, "Entities: {}", stats.total_entities);
    let _ = writeln!(body, "Succeeded: {}", stats.succeeded);
    let _ = writeln!(body, "Failed: {}", stats.failed);
    let _ = writeln!(body, "Stopped at duplicate: {}", stats.stopped_at_duplicate);
    let _ = writeln!(body, "Records collected: {}", stats.total_records);
    if let Some(hash) = config_hash {
        let _ = writeln!(body, "Config hash: {}", hash);
    }
    body
}
