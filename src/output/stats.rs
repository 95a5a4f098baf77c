//! Run statistics and report printing
//!
//! `RunStats` is built up by the orchestrator during a run; the audit store's
//! collection summary backs the `stats` command.

use crate::model::SourceType;
use crate::storage::SourceSummary;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Counters for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    /// Entities loaded from the entity source
    pub total_entities: u64,

    /// Entities whose records and audit rows were saved
    pub succeeded: u64,

    /// Entities that failed and were logged
    pub failed: u64,

    /// Records saved across all succeeded entities
    pub total_records: u64,

    /// Succeeded entities that stopped at an already collected record
    pub stopped_at_duplicate: u64,

    pub start_time: DateTime<Utc>,
}

impl RunStats {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            total_entities: 0,
            succeeded: 0,
            failed: 0,
            total_records: 0,
            stopped_at_duplicate: 0,
            start_time,
        }
    }

    /// Entities that were neither saved nor failed (interrupted runs)
    pub fn unprocessed(&self) -> u64 {
        self.total_entities
            .saturating_sub(self.succeeded + self.failed)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every entity was processed (some may have failed)
    Completed,

    /// The entity source returned no entities
    NothingToDo,

    /// Stopped between entities by an external signal
    Interrupted { remaining: u64 },

    /// A fatal setup or run-level error prevented processing
    Aborted { reason: String },
}

impl RunOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::NothingToDo => write!(f, "nothing to do"),
            Self::Interrupted { remaining } => {
                write!(f, "interrupted ({} entities not processed)", remaining)
            }
            Self::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}

/// Final report of one orchestrator run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub source: SourceType,
    pub outcome: RunOutcome,
    pub stats: RunStats,
    pub elapsed: Duration,
}

/// Formats a duration as `1h 02m 03s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}.{:01}s", s, elapsed.subsec_millis() / 100)
    }
}

/// Prints a run report to stdout in a formatted manner
pub fn print_run_report(report: &RunReport) {
    let stats = &report.stats;

    println!("=== Collection Run: {} ===\n", report.source);

    println!("Outcome: {}", report.outcome);
    println!(
        "Started: {}",
        stats.start_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Elapsed: {}", format_elapsed(report.elapsed));
    println!();

    println!("Entities:");
    println!("  Total: {}", stats.total_entities);
    println!("  Succeeded: {}", stats.succeeded);
    println!("  Failed: {}", stats.failed);
    println!("  Stopped at duplicate: {}", stats.stopped_at_duplicate);
    if stats.unprocessed() > 0 {
        println!("  Not processed: {}", stats.unprocessed());
    }
    println!();

    println!("Records collected: {}", stats.total_records);

    if stats.total_entities > 0 {
        let success_rate = (stats.succeeded as f64 / stats.total_entities as f64) * 100.0;
        println!(
            "Success Rate: {:.1}% ({} / {} entities)",
            success_rate, stats.succeeded, stats.total_entities
        );
    }
}

/// Prints per-source collection volume from the audit store
pub fn print_collection_summary(summaries: &[SourceSummary]) {
    println!("=== Collection Statistics ===\n");

    if summaries.is_empty() {
        println!("No collection attempts recorded yet.");
        return;
    }

    println!(
        "{:<16} {:>10} {:>12} {:>10}  Last check",
        "Source", "Attempts", "Records", "Entities"
    );
    for summary in summaries {
        let last = summary
            .last_checked
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:>10} {:>12} {:>10}  {}",
            summary.source_type, summary.attempts, summary.records, summary.entities_checked, last
        );
    }

    let total_records: u64 = summaries.iter().map(|s| s.records).sum();
    println!();
    println!("Total records collected: {}", total_records);
}
