//! Folio CLI - portfolio valuation and risk from the command line.
//!
//! Prints JSON on stdout; logs go to stderr (`RUST_LOG` overrides the level).

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use folio_core::{
    engine,
    loader::{load_positions_from_path, LoadedPositions},
    provider::CsvDirectoryProvider,
    ApiResponse, Currency, DateWindow, EngineConfig, FxRateCache, RiskHorizon,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Folio - portfolio valuation and risk analytics")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.folio/config.toml or $FOLIO_CONFIG_FILE)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Value the portfolio and compute risk metrics
    Analyze {
        /// Positions CSV (Ticker,Shares,AvgCost[,Currency][,CostDate])
        #[arg(short, long)]
        positions: PathBuf,
        /// Directory of price files (<TICKER>.csv, fx/<PAIR>.csv)
        #[arg(long)]
        prices: PathBuf,
        /// Reporting currency, overrides the config
        #[arg(short, long)]
        reporting_currency: Option<Currency>,
        /// First date of price history (default: end minus history_days)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last date of price history (default: today)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Horizon for scaled risk (daily, monthly, annual), overrides the config
        #[arg(long)]
        horizon: Option<RiskHorizon>,
    },
    /// Load and validate a positions file
    Positions {
        #[arg(short, long)]
        positions: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let output = match handle(cli).await {
        Ok(value) => serde_json::to_string_pretty(&ApiResponse::ok(value))?,
        Err(e) => {
            tracing::error!("{:#}", e);
            let response = serde_json::to_string_pretty(&ApiResponse::<()>::err(format!("{e:#}")))?;
            println!("{}", response);
            std::process::exit(1);
        }
    };

    println!("{}", output);
    Ok(())
}

async fn handle(cli: Cli) -> Result<serde_json::Value> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            positions,
            prices,
            reporting_currency,
            start,
            end,
            horizon,
        } => {
            if let Some(currency) = reporting_currency {
                config.reporting_currency = currency;
            }
            let loaded = load(&positions)?;

            let end = end.unwrap_or_else(|| Utc::now().date_naive());
            let window = match start {
                Some(start) => DateWindow::new(start, end)?,
                None => DateWindow::trailing(end, config.fetch.history_days),
            };

            let provider = CsvDirectoryProvider::new(&prices);
            let mut cache = FxRateCache::new(config.fx_cache_ttl());
            let mut data = folio_core::provider::fetch_market_data(
                &provider,
                &loaded.positions,
                window,
                &config,
                &mut cache,
            )
            .await;
            data.omissions.extend(loaded.omissions());

            let snapshot = engine::analyze(&loaded.positions, &data, &config)
                .context("analysis failed")?;

            let horizon = config.horizon_or(horizon);
            let scaled = snapshot.risk().report().map(|r| r.scaled(horizon));
            Ok(json!({
                "snapshot": to_value(&snapshot)?,
                "scaled_risk": to_value(&scaled)?,
            }))
        }
        Commands::Positions { positions } => {
            let loaded = load(&positions)?;
            Ok(json!({
                "positions": loaded.positions,
                "position_count": loaded.positions.len(),
                "rejected": loaded.rejected,
            }))
        }
        Commands::Config => Ok(json!({
            "path": cli
                .config
                .unwrap_or_else(EngineConfig::default_path)
                .display()
                .to_string(),
            "config": to_value(&config)?,
        })),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::load_default(),
    };
    config.context("failed to load configuration")
}

fn load(path: &Path) -> Result<LoadedPositions> {
    load_positions_from_path(path)
        .with_context(|| format!("failed to read positions from {}", path.display()))
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}
