use anyhow::{Context, Result};
use clap::Parser;
use cronscan::db::SqliteTaskStore;
use cronscan::{Config, RunSummary, ScanPlan};
use std::path::PathBuf;
use std::time::Duration;

/// Longest the runtime waits for blocking work (e.g. a hung crontab read) at exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "cronscan")]
#[command(about = "Snapshot the crontabs of configured users into the cronscan database")]
struct Args {
    /// Config file (defaults to $CRONSCAN_CONFIG, then ./config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scan these users instead of the configured list (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    users: Option<Vec<String>>,

    /// Ingest commented-out entries too
    #[arg(long)]
    include_commented: bool,

    /// Print the run summary to stdout as JSON
    #[arg(long)]
    summary_json: bool,
}

fn main() -> Result<()> {
    // Before the config so --config runs see .env too
    cronscan::config::load_env();

    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => Config::from_path(path),
        None => Config::load(),
    };

    let level = loaded
        .as_ref()
        .map(|c| c.cronscan.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", level)
    ).init();

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            log::error!("Fatal: could not load configuration: {:#}", e);
            return Err(e);
        }
    };

    if let Some(users) = args.users {
        config.override_users(users).context("Invalid --users")?;
    }
    if args.include_commented {
        config.scan.include_commented_entries = true;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let outcome = runtime.block_on(ingest(&config));

    // A timed-out crontab read leaves its blocking thread behind; don't wait on it forever
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    let summary = outcome?;
    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

async fn ingest(config: &Config) -> Result<RunSummary> {
    log::info!("Starting cronscan v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Spool root: {}", config.spool_root().display());
    log::info!("Database path: {}", config.db_path().display());
    log::info!(
        "Users: {} (include commented: {})",
        config.scan.users.join(","),
        config.scan.include_commented_entries
    );

    let store = SqliteTaskStore::open(config.db_path())
        .await
        .with_context(|| format!("Failed to open record store at {}", config.db_path().display()))?;

    let plan = ScanPlan::from_config(config);
    let outcome = cronscan::run(&store, &plan).await;

    // The store is shut down whether or not the run succeeded
    if let Err(e) = store.shutdown(config.drain_delay(), config.settle_delay()).await {
        log::error!("Record store shutdown failed: {}", e);
    }

    match outcome {
        Ok(summary) => {
            summary.log();
            Ok(summary)
        }
        Err(e) => {
            log::error!("Fatal: {}", e);
            Err(e.into())
        }
    }
}
