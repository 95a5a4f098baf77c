//! Entity-Harvest main entry point
//!
//! This is the command-line interface for the Entity-Harvest collector.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use entity_harvest::config::{load_config_with_hash, Config, DocumentBackend};
use entity_harvest::crawler::{
    abort_before_run, build_http_client, orchestrator_for, SessionRegistry,
};
use entity_harvest::output::{build_notifier, print_collection_summary, print_run_report};
use entity_harvest::storage::{
    open_audit_store, open_document_store, AuditStore, DocumentStore, SqliteAuditStore,
};
use entity_harvest::SourceType;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Entity-Harvest: a resilient per-entity record collector
///
/// Each run collects one source type (patents, news, trends, R&D projects, ...)
/// for every registered entity, skipping what was already ingested.
#[derive(Parser, Debug)]
#[command(name = "entity-harvest")]
#[command(version)]
#[command(about = "A resilient per-entity record collector", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect patents
    Patent,
    /// Collect utility models
    UtilityModel,
    /// Collect designs
    Design,
    /// Collect trademarks
    Trademark,
    /// Collect news articles
    News,
    /// Collect search-trend series
    Trend,
    /// Collect R&D project metadata
    Project,
    /// Collect organization information
    OrgInfo,
    /// Collect research papers
    ResearchPaper,
    /// Show per-source collection statistics from the audit database and exit
    Stats,
    /// Validate the configuration and show the configured sources
    CheckConfig,
}

impl Command {
    fn source_type(&self) -> Option<SourceType> {
        match self {
            Self::Patent => Some(SourceType::Patent),
            Self::UtilityModel => Some(SourceType::UtilityModel),
            Self::Design => Some(SourceType::Design),
            Self::Trademark => Some(SourceType::Trademark),
            Self::News => Some(SourceType::News),
            Self::Trend => Some(SourceType::Trend),
            Self::Project => Some(SourceType::Project),
            Self::OrgInfo => Some(SourceType::OrgInfo),
            Self::ResearchPaper => Some(SourceType::ResearchPaper),
            Self::Stats | Self::CheckConfig => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command.source_type() {
        Some(source) => handle_collect(config, config_hash, source).await,
        None => match cli.command {
            Command::Stats => handle_stats(&config),
            _ => {
                handle_check_config(&config, &config_hash);
                Ok(())
            }
        },
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("entity_harvest=info,warn"),
            1 => EnvFilter::new("entity_harvest=debug,info"),
            2 => EnvFilter::new("entity_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Stores and client a collection run works with
struct RunResources {
    client: Client,
    audit: Arc<SqliteAuditStore>,
    documents: Arc<dyn DocumentStore>,
}

fn open_resources(
    config: &Config,
    client: reqwest::Result<Client>,
) -> anyhow::Result<RunResources> {
    let client = client.context("failed to build HTTP client")?;
    let audit = Arc::new(
        open_audit_store(Path::new(&config.storage.audit_database))
            .context("failed to open audit database")?,
    );
    let documents = open_document_store(&config.storage, client.clone())
        .context("failed to open document store")?;
    Ok(RunResources {
        client,
        audit,
        documents,
    })
}

/// Runs one collection cycle for `source`
async fn handle_collect(config: Config, config_hash: String, source: SourceType) -> anyhow::Result<()> {
    let client = build_http_client(&config.http);

    // The notifier comes first so a run that cannot start is still reported
    let fallback = Client::new();
    let notifier = build_notifier(&config.notification, client.as_ref().unwrap_or(&fallback));

    let RunResources {
        client,
        audit,
        documents,
    } = match open_resources(&config, client) {
        Ok(resources) => resources,
        Err(e) => {
            let report =
                abort_before_run(source, format!("{:#}", e), notifier.as_ref(), Some(&config_hash))
                    .await;
            print_run_report(&report);
            return Err(e);
        }
    };
    let registry = SessionRegistry::from_config(&config, &client);

    let orchestrator = orchestrator_for(
        &config,
        &registry,
        source,
        audit.clone(),
        audit,
        documents,
        notifier,
    )
    .with_config_hash(config_hash);

    // Stop between entities on Ctrl-C; finalization still runs
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current entities");
            cancel.cancel();
        }
    });

    let report = orchestrator.run().await;
    print_run_report(&report);

    if report.outcome.is_aborted() {
        bail!("{} collection {}", source, report.outcome);
    }
    Ok(())
}

/// Handles the `stats` command: shows collection statistics from the audit database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let audit = open_audit_store(Path::new(&config.storage.audit_database))
        .context("failed to open audit database")?;
    let summaries = audit
        .collection_summary()
        .context("failed to read collection summary")?;
    print_collection_summary(&summaries);
    Ok(())
}

/// Handles the `check-config` command: shows what the configuration resolves to
fn handle_check_config(config: &Config, config_hash: &str) {
    println!("=== Entity-Harvest Configuration ===\n");

    println!("Config hash: {}", config_hash);
    println!();

    println!("Retry:");
    println!("  Max attempts: {}", config.retry.max_retries);
    println!(
        "  Backoff: {}ms x{} (max {}ms, jitter {:.0}%)",
        config.retry.base_delay_ms,
        config.retry.multiplier,
        config.retry.max_delay_ms,
        config.retry.jitter_ratio * 100.0
    );
    println!("  Retryable statuses: {:?}", config.retry.retryable_statuses);
    println!("  Rate-limit statuses: {:?}", config.retry.rate_limit_statuses);
    println!();

    println!("Storage:");
    println!("  Audit database: {}", config.storage.audit_database);
    println!("  Document store: {:?}", config.storage.document_store);
    if config.storage.document_store == DocumentBackend::Elasticsearch {
        println!(
            "  Note: map source_type, entity_id and data.<natural key> as keyword in the index"
        );
    }
    println!("  Operator id: {}", config.storage.operator_id);
    println!();

    println!("Workers: {}", config.run.workers);
    println!("Notification: {:?}", config.notification.kind);
    println!();

    println!("Sources ({}):", config.sources.len());
    for source in &config.sources {
        let key = source
            .source_type
            .natural_key_field()
            .unwrap_or("(not deduplicated)");
        println!("  - {} -> {}", source.source_type, source.endpoint);
        println!(
            "      query {}={:?}, page size {}, natural key {}",
            source.query_param, source.query_field, source.page_size, key
        );
        if !source.credentials.is_empty() {
            println!("      credentials: {}", source.credentials.len());
        }
    }

    let missing: Vec<&str> = SourceType::ALL
        .iter()
        .filter(|s| config.source(**s).is_none())
        .map(|s| s.as_str())
        .collect();
    if !missing.is_empty() {
        println!();
        println!("Not configured: {}", missing.join(", "));
    }

    println!("\n✓ Configuration is valid");
}
