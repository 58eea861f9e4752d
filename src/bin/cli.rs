//! Catalog notifier CLI
//!
//! Local execution entry point, meant to be run by an external timer. For
//! AWS Lambda, use `notifier-lambda`.

use std::path::PathBuf;
use std::sync::Arc;

use catalog_notifier::{
    config::{DEFAULT_CONFIG_PATH, load_config},
    error::{AppError, Result},
    models::Config,
    pipeline::Notifier,
    storage::{LocalStorage, NotifiedStore},
};
use chrono::Utc;
use clap::{Parser, Subcommand};

/// Announces newly added catalog titles to a Discord webhook
#[derive(Parser, Debug)]
#[command(name = "notifier", version, about = "Streaming catalog new-title notifier")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once
    Run,

    /// Show the notified set and the last run summary
    Status {
        /// Number of recent records to list
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the most recent provider calls
    Calls {
        /// Number of calls to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Replace the notified set with an empty one
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Validate configuration and credentials
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli.config);
    let storage = Arc::new(LocalStorage::from_config(&config.paths));

    match cli.command {
        Command::Run => run(&config, storage).await?,
        Command::Status { limit } => status(storage.as_ref(), limit).await?,
        Command::Calls { limit } => calls(storage.as_ref(), limit).await?,
        Command::Reset { yes } => {
            if !yes {
                return Err(AppError::validation(format!(
                    "refusing to reset {} without --yes",
                    storage.location()
                )));
            }
            storage.reset().await?;
            log::warn!("Notified set at {} has been reset", storage.location());
        }
        Command::Validate => validate(&config)?,
    }

    Ok(())
}

async fn run(config: &Config, storage: Arc<LocalStorage>) -> Result<()> {
    let notifier = Notifier::from_config(config, storage)?;
    let summary = notifier.run(Utc::now().date_naive()).await;

    match &summary.persist_error {
        Some(e) => Err(AppError::store(format!(
            "{} notifications sent but not recorded: {}",
            summary.sent(),
            e
        ))),
        None => Ok(()),
    }
}

async fn status(storage: &LocalStorage, limit: usize) -> Result<()> {
    let set = storage.load().await?;
    log::info!("Notified set: {} ({} records)", storage.location(), set.len());
    for record in set.most_recent(limit) {
        log::info!(
            "  {}  {:<12} {}",
            record.sent_at.format("%Y-%m-%d %H:%M"),
            record.identity,
            record.title
        );
    }

    match storage.load_summary().await? {
        Some(summary) => {
            log::info!(
                "Last run: {} ({}s)",
                summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
                (summary.finished_at - summary.started_at).num_seconds()
            );
            for (label, value) in summary.lines() {
                log::info!("  {:<18} {}", label, value);
            }
            for region in summary.regions.iter().filter(|r| r.fetch_error.is_some()) {
                log::info!(
                    "  {} fetch error: {}",
                    region.region,
                    region.fetch_error.as_deref().unwrap_or_default()
                );
            }
        }
        None => log::info!("No run recorded yet."),
    }
    Ok(())
}

async fn calls(storage: &LocalStorage, limit: usize) -> Result<()> {
    let journal = storage.load_journal().await?;
    if journal.is_empty() {
        log::info!("No provider calls recorded yet.");
        return Ok(());
    }
    for call in journal.latest(limit) {
        let status = call
            .status_code
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string());
        log::info!(
            "{}  {:<8} {} {}",
            call.timestamp.format("%Y-%m-%d %H:%M:%S"),
            call.api,
            status,
            call.endpoint
        );
        if let Some(error) = &call.error {
            log::info!("    error: {}", error);
        }
    }
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    log::info!("Validating configuration...");
    config.validate()?;
    log::info!(
        "✓ Config OK: regions {:?}, window {} days",
        config.run.regions,
        config.run.lookback_days
    );

    config.require_credentials()?;
    log::info!("✓ Credentials present: {:?}", config.credentials);
    if config.credentials.metadata_api_key.is_none() {
        log::warn!("No metadata API key: cards will use catalog synopses only");
    }
    Ok(())
}
