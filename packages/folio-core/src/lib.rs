//! Folio Core - Portfolio valuation and risk analytics engine.
//!
//! This crate turns a list of holdings and raw market data into a single
//! immutable [`PortfolioSnapshot`]:
//!
//! - **Currency normalization**: native price series converted into one reporting
//!   currency with time-matched (forward-filled) FX rates
//! - **Return alignment**: per-ticker daily returns on a union trading-date index
//! - **Valuation**: market value, cost basis and unrealized P&L per position
//! - **Risk metrics**: volatility, historical/parametric VaR, CVaR, stress tests
//! - **Market data fetch**: bounded, concurrent, timeout-guarded provider calls
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use folio_core::{
//!     engine, fx::FxRateCache, provider::InMemoryProvider, Currency, DateWindow, EngineConfig,
//!     Position,
//! };
//!
//! # async fn demo() -> folio_core::Result<()> {
//! let positions = vec![Position::new("AAPL", 100.0, 15000.0, Currency::JPY)?];
//! let provider = InMemoryProvider::new();
//! let config = EngineConfig::default();
//! let mut cache = FxRateCache::new(config.fx_cache_ttl());
//!
//! let end = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
//! let window = DateWindow::trailing(end, config.fetch.history_days);
//! let snapshot = engine::run(&provider, &positions, window, &config, &mut cache).await?;
//! println!("Market value: {}", snapshot.valuation().total_market_value);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod fx;
pub mod loader;
pub mod portfolio;
pub mod provider;
pub mod report;
pub mod returns;
pub mod types;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use config::{EngineConfig, FetchConfig, RiskHorizon, StressConfig};
pub use engine::{analyze, run, DateWindow};
pub use loader::{load_positions, load_positions_from_path, LoadedPositions, RecordError};
pub use provider::{
    fetch_market_data, CsvDirectoryProvider, InMemoryProvider, MarketData, MarketDataProvider,
};
pub use report::{Omission, PortfolioSnapshot, RiskOutcome, SnapshotStatus, Stage};
pub use returns::{align, AlignedReturnMatrix};
pub use types::{
    ApiResponse, Currency, CurrencyPair, FxRate, NormalizedSeries, Position, PricePoint,
    PriceSeries,
};

// Re-export main functionality
pub use fx::{normalize, FxRateCache, RateHistory, RateSource, RateTable};
pub use portfolio::{
    calculate_risk_report, value_positions, PortfolioSummary, PortfolioValuation, RiskReport,
    ScaledRisk, TailRisk, Valuation,
};

/// Error types for folio-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Missing FX rate for {pair} on or before {date}")]
    MissingRate { pair: CurrencyPair, date: NaiveDate },

    #[error("Insufficient history: no ticker has at least two price observations")]
    InsufficientHistory,

    #[error("Cannot value position {ticker}: {reason}")]
    PositionValuation { ticker: String, reason: String },

    #[error("Insufficient data: {available} observations, need at least {required}")]
    InsufficientData { required: usize, available: usize },

    #[error("Provider timed out after {timeout_ms} ms: {request}")]
    ProviderTimeout { request: String, timeout_ms: u64 },

    #[error("Malformed record on line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Invalid price series for {ticker}: {reason}")]
    InvalidSeries { ticker: String, reason: String },

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Classify the error for tagging in snapshots and JSON output.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingRate { .. } => ErrorKind::MissingRate,
            Error::InsufficientHistory => ErrorKind::InsufficientHistory,
            Error::PositionValuation { .. } => ErrorKind::PositionValuation,
            Error::InsufficientData { .. } => ErrorKind::InsufficientData,
            Error::ProviderTimeout { .. } => ErrorKind::ProviderTimeout,
            Error::MalformedRecord { .. } => ErrorKind::MalformedRecord,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Provider(_) => ErrorKind::Provider,
            Error::UnknownCurrency(_) | Error::InvalidSeries { .. } | Error::InvalidPosition(_) => {
                ErrorKind::InvalidInput
            }
            Error::InvalidConfig(_) | Error::Toml(_) => ErrorKind::Config,
            Error::Io(_) | Error::Json(_) | Error::Csv(_) => ErrorKind::Io,
        }
    }
}

/// Serializable classification of an [`Error`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingRate,
    InsufficientHistory,
    PositionValuation,
    InsufficientData,
    ProviderTimeout,
    MalformedRecord,
    NotFound,
    Provider,
    InvalidInput,
    Config,
    Io,
}

/// Result type for folio-core operations.
pub type Result<T> = std::result::Result<T, Error>;
