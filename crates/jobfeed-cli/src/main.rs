use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use jobfeed_core::Posting;
use jobfeed_extract::{parse_feed_page, Assembly, PostingAssembler, SkipReason};
use jobfeed_storage::PgPostingStore;
use jobfeed_sync::SyncConfig;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "jobfeed-cli")]
#[command(about = "Channel job feed: crawl, serve and inspect job postings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl the channel once and persist the result.
    Crawl {
        #[arg(long)]
        lookback_days: Option<i64>,
        /// Print the full crawl report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP API with the background refresh.
    Serve,
    /// Apply database migrations (needs DATABASE_URL).
    Migrate,
    /// Run extraction over a saved channel page.
    Parse {
        file: PathBuf,
        /// Origin used to resolve the page's relative links.
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct SkippedMessage {
    id: Option<String>,
    reason: SkipReason,
}

#[derive(Debug, Serialize)]
struct ParseOutput {
    postings: Vec<Posting>,
    skipped: Vec<SkippedMessage>,
    next_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Crawl {
            lookback_days,
            json,
        } => {
            let mut config = SyncConfig::from_env();
            if let Some(days) = lookback_days {
                config.lookback_days = days;
            }
            let report = jobfeed_sync::run_sync_once(&config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "crawl complete: postings={} pages={} outcome={:?} skipped(missing_body={} not_recruitment={} low_quality={} duplicate={})",
                    report.postings.len(),
                    report.pages,
                    report.outcome,
                    report.skipped.missing_body,
                    report.skipped.not_recruitment,
                    report.skipped.low_quality,
                    report.skipped.duplicate,
                );
            }
        }
        Commands::Serve => jobfeed_web::serve_from_env().await?,
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is not set")?;
            let store = PgPostingStore::connect(url).await?;
            store.migrate().await.context("applying migrations")?;
            info!("migrations applied");
        }
        Commands::Parse { file, base_url } => {
            let config = SyncConfig::from_env();
            let html = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let base_url = base_url.unwrap_or_else(|| config.feed_url.clone());
            let page = parse_feed_page(&html, &base_url)?;
            let assembler = PostingAssembler::new(config.keywords()?);
            let today = Utc::now().date_naive();

            let mut output = ParseOutput {
                postings: Vec::new(),
                skipped: Vec::new(),
                next_url: page.next_url,
            };
            for message in page.messages.iter().rev() {
                match assembler.assemble(message, today) {
                    Assembly::Posting(posting) => output.postings.push(posting),
                    Assembly::Skipped(reason) => output.skipped.push(SkippedMessage {
                        id: message.id.clone(),
                        reason,
                    }),
                }
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
