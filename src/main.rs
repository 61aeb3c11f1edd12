//! Trekky-Harvest main entry point
//!
//! This is the command-line interface for the Trekky-Harvest review harvester.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use trekky_harvest::config::{load_config_with_hash, Config, MAX_SESSIONS};
use trekky_harvest::output::{print_statistics, write_csv, HarvestStatistics};
use trekky_harvest::{harvest, HttpTransport};
use tracing_subscriber::EnvFilter;

/// Trekky-Harvest: a concurrent accommodation review harvester
///
/// Trekky-Harvest runs independent sessions against a bot-protected catalog,
/// solving its capability handshake and collecting accommodations with their
/// guest reviews into a CSV file.
#[derive(Parser, Debug)]
#[command(name = "trekky-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A concurrent accommodation review harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Override the number of concurrent sessions
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=MAX_SESSIONS as i64))]
    sessions: Option<u32>,

    /// Override the CSV output path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Validate config and show the harvest plan without touching the network
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(sessions) = cli.sessions {
        config.harvest.sessions = sessions;
    }
    if let Some(output) = &cli.output {
        config.output.csv_path = output.display().to_string();
    }

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_harvest(config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trekky_harvest=info,warn"),
            1 => EnvFilter::new("trekky_harvest=debug,info"),
            2 => EnvFilter::new("trekky_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the harvest plan
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Trekky-Harvest Dry Run ===\n");

    println!("Harvest:");
    println!("  Start URL: {}", config.start_url()?);
    println!("  Sessions: {}", config.harvest.sessions);
    println!("  City: {}", config.harvest.city);
    println!("  Follow pagination: {}", config.harvest.follow_pagination);

    println!("\nNavigation:");
    println!("  Initial wait: {:?}", config.navigation.initial_wait);
    println!("  Subsequent wait: {:?}", config.navigation.subsequent_wait);
    println!("  Timeout: {}ms", config.navigation.timeout_ms);
    println!("  Settle delay: {}ms", config.navigation.settle_delay_ms);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms doubling to {}ms (x{} after HTTP 429)",
        config.retry.base_delay_ms, config.retry.max_delay_ms, config.retry.rate_limit_multiplier
    );

    match config.handshake_url() {
        Some(url) => println!("\nHandshake: enabled ({})", url?),
        None => println!("\nHandshake: disabled"),
    }

    println!("\nListing entry points:");
    for session_id in 1..=config.harvest.sessions {
        println!("  #{}: {}", session_id, config.listing_url(session_id)?);
    }

    println!("\nOutput:");
    println!("  CSV: {}", config.output.csv_path);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Harvesting {} with {} sessions",
        config.harvest.start_url,
        config.harvest.sessions
    );

    let csv_path = PathBuf::from(&config.output.csv_path);
    let transport = Arc::new(HttpTransport::new(config.client.clone()));
    let report = harvest(Arc::new(config), transport).await?;

    // Written even when every session failed
    let rows = write_csv(&csv_path, &report.records)
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;
    tracing::info!("Wrote {} records to {}", rows, csv_path.display());

    print_statistics(&HarvestStatistics::from_report(&report));

    report.ensure_any_succeeded()?;
    Ok(())
}
