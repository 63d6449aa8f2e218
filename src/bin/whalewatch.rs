use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use polymarket_whalewatch::api::DataApi;
use polymarket_whalewatch::config::{AppConfig, CONFIG_PATH, Settings};
use polymarket_whalewatch::monitor::{finish_run, run_once};
use polymarket_whalewatch::state::StateStore;
use polymarket_whalewatch::wallet_age::WalletAgeResolver;

#[derive(Parser)]
#[command(
    name = "whalewatch",
    about = "One-shot Polymarket whale and new-account trade alerts"
)]
struct Args {
    /// Path to the TOML config file (defaults apply if it does not exist)
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Directory for persisted wallet-age and seen-trade state
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Number of most recent trades to scan
    #[arg(long)]
    limit: Option<u32>,

    /// Also write the alert text to this file for downstream delivery
    #[arg(long)]
    alerts_file: Option<PathBuf>,

    /// Classify and print alerts without saving state
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env first so RUST_LOG from it reaches the filter.
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!("Failed to load .env: {e}");
        }
    }

    let args = Args::parse();

    let config = AppConfig::load_or_default(&args.config)?;
    let settings = Settings::from_env(&config.thresholds)?;
    let trade_limit = args.limit.unwrap_or(config.api.trade_limit);
    if trade_limit == 0 {
        anyhow::bail!("--limit must be positive");
    }
    let store = StateStore::new(args.state_dir.unwrap_or_else(|| config.state.dir.clone()));

    info!(
        "Starting whalewatch: large={} new_account={} age<{}d retention={}d ttl={}d limit={} state={}",
        settings.large_trade_threshold,
        settings.new_account_threshold,
        settings.account_age_days,
        settings.seen_trade_retention_days,
        settings.wallet_ts_ttl_days,
        trade_limit,
        store.dir().display(),
    );

    let api = DataApi::new(&config.api).context("failed to build data API client")?;
    let wallet_ages = store.load_wallet_ages();
    let mut seen = store.load_seen_trades();
    info!(
        "Loaded state: {} wallet ages, {} seen trades",
        wallet_ages.len(),
        seen.len()
    );

    let mut resolver = WalletAgeResolver::new(&api, wallet_ages, settings.wallet_ts_ttl_days);
    let now = chrono::Utc::now();
    let report = run_once(&api, &mut resolver, &mut seen, &settings, trade_limit, now).await?;

    finish_run(
        &report,
        &store,
        resolver.cache(),
        &seen,
        args.alerts_file.as_deref(),
        args.dry_run,
    )
}
