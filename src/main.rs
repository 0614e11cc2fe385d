use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use feedwatch::config::{env_var_opt, env_var_or, load_feeds};
use feedwatch::db::Database;
use feedwatch::enrich::{Enricher, EnricherConfig};
use feedwatch::extract::ContentExtractor;
use feedwatch::feed::{FeedIngestor, DEFAULT_ENTRY_LIMIT};
use feedwatch::filter::FilterEngine;
use feedwatch::logging;
use feedwatch::notify::{DiscordNotifier, Notifier, StdoutNotifier};
use feedwatch::pipeline::{Pipeline, PipelineOptions, DEFAULT_CLEANUP_DAYS};

/// Polls the configured feeds once and notifies new, relevant entries.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding feeds.toml and filters.toml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Seen-entry database (overrides DATABASE_PATH)
    #[arg(long)]
    db: Option<String>,

    /// Directory for feed.log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Entries taken per feed
    #[arg(long, default_value_t = DEFAULT_ENTRY_LIMIT)]
    limit: usize,

    /// Skip LLM titles and summaries
    #[arg(long)]
    no_enrich: bool,

    /// Forget seen entries older than this many days
    #[arg(long, default_value_t = DEFAULT_CLEANUP_DAYS)]
    cleanup_days: u32,

    /// Print the batch instead of posting it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.log_dir)
        .with_context(|| format!("creating log directory {}", cli.log_dir.display()))?;
    logging::configure_logging(&cli.log_dir);

    let feeds = load_feeds(&cli.config_dir.join("feeds.toml"))?;
    let filter = FilterEngine::from_path(&cli.config_dir.join("filters.toml"))?;
    info!("Loaded {} feeds, {} rules", feeds.len(), filter.rules.len());

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| env_var_or("DATABASE_PATH", "data/seen.db"));
    let db = Database::new(&db_path)
        .await
        .with_context(|| format!("opening seen database {}", db_path))?;

    let notifier: Box<dyn Notifier> = match (cli.dry_run, env_var_opt("DISCORD_WEBHOOK_URL")) {
        (false, Some(webhook)) => Box::new(DiscordNotifier::new(webhook)),
        (false, None) => {
            warn!("DISCORD_WEBHOOK_URL is not set, printing entries instead");
            Box::new(StdoutNotifier)
        }
        (true, _) => Box::new(StdoutNotifier),
    };

    let ingestor = FeedIngestor::new().context("building HTTP client")?;
    let mut pipeline = Pipeline::new(ingestor, Box::new(db), Box::new(filter), notifier)
        .with_options(PipelineOptions {
            limit: cli.limit,
            cleanup_days: cli.cleanup_days,
        });

    if !cli.no_enrich {
        let config = EnricherConfig::from_env();
        info!("Enriching with {} at {}", config.model, config.base_url);
        let extractor = ContentExtractor::new().context("building HTTP client")?;
        let enricher = Enricher::new(&config, extractor).context("configuring Ollama")?;
        pipeline = pipeline.with_enricher(enricher);
    }

    let report = pipeline.run(&feeds).await;
    info!(
        "Run finished: {} fetched, {} already seen, {} filtered out, {} notified, {} enriched",
        report.fetched, report.skipped_seen, report.rejected, report.notified, report.enriched
    );

    Ok(())
}
