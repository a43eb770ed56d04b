//! Analysis pipeline.
//!
//! [`analyze`] is the synchronous core: normalize, align, value, measure risk
//! and assemble. [`run`] fetches market data first and then calls it.

use crate::config::EngineConfig;
use crate::fx::{normalize, FxRateCache};
use crate::portfolio::{
    calculate_risk_report, region_allocation, value_positions, ConcentrationAnalysis,
    PortfolioSummary,
};
use crate::provider::{fetch_market_data, MarketData, MarketDataProvider};
use crate::report::{
    assemble, FxUsage, Omission, PortfolioAnalytics, PortfolioSnapshot, RiskOutcome,
    SnapshotInputs, Stage,
};
use crate::returns::align;
use crate::types::{NormalizedSeries, Position};
use crate::{Error, ErrorKind, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inclusive date range of price history to fetch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidConfig(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` calendar days up to and including `end`.
    pub fn trailing(end: NaiveDate, days: i64) -> Self {
        Self {
            start: end - Duration::days(days.max(0)),
            end,
        }
    }
}

/// Analyze already-fetched market data.
///
/// Per-ticker and per-position problems become omissions and the snapshot is
/// marked partial. Risk failures leave the valuation in place.
///
/// # Errors
///
/// `Error::InvalidConfig` for an unusable configuration and
/// `Error::InsufficientHistory` when no ticker has two normalized prices.
pub fn analyze(
    positions: &[Position],
    data: &MarketData,
    config: &EngineConfig,
) -> Result<PortfolioSnapshot> {
    config.validate()?;
    let reporting = config.reporting_currency;
    let mut omissions: Vec<Omission> = data.omissions.clone();

    let mut normalized: Vec<NormalizedSeries> = Vec::with_capacity(data.series.len());
    for series in &data.series {
        match normalize(series, reporting, &data.rates) {
            Ok(n) => normalized.push(n),
            Err(e) => {
                tracing::warn!("Cannot normalize {}: {}", series.ticker(), e);
                omissions.push(Omission::from_error(series.ticker(), Stage::Normalize, &e));
            }
        }
    }

    let matrix = align(&normalized)?;
    for ticker in matrix.excluded() {
        omissions.push(Omission::new(
            ticker.clone(),
            Stage::Align,
            ErrorKind::InsufficientHistory,
            "fewer than two price observations",
        ));
    }

    let as_of = normalized
        .iter()
        .filter_map(|s| s.latest().map(|p| p.date))
        .max()
        .unwrap_or(data.window.end);

    let prices: HashMap<String, NormalizedSeries> = normalized
        .into_iter()
        .map(|s| (s.ticker().to_string(), s))
        .collect();
    let valuation = value_positions(positions, &prices, &data.rates, reporting);

    let risk = RiskOutcome::from_result(calculate_risk_report(&matrix, &valuation, config));
    if let RiskOutcome::Unavailable { reason, .. } = &risk {
        tracing::warn!("Risk metrics unavailable: {}", reason);
    }

    let analytics = PortfolioAnalytics {
        summary: PortfolioSummary::from_valuation(&valuation),
        concentration: ConcentrationAnalysis::from_valuation(&valuation),
        regions: region_allocation(&valuation),
    };

    let mut fx: Vec<FxUsage> = data
        .rates
        .histories()
        .map(|h| FxUsage {
            pair: h.pair(),
            source: h.source(),
        })
        .collect();
    fx.sort_by_key(|u| u.pair);

    let snapshot = assemble(SnapshotInputs {
        as_of,
        valuation,
        analytics,
        risk,
        omissions,
        fx,
    });

    tracing::info!(
        "Snapshot as of {}: {:?} with {} omissions",
        snapshot.as_of(),
        snapshot.status(),
        snapshot.omissions().len()
    );
    Ok(snapshot)
}

/// Fetch market data for `positions` over `window`, then analyze it.
///
/// `cache` is reused across runs so FX pairs are fetched at most once per TTL.
pub async fn run<P>(
    provider: &P,
    positions: &[Position],
    window: DateWindow,
    config: &EngineConfig,
    cache: &mut FxRateCache,
) -> Result<PortfolioSnapshot>
where
    P: MarketDataProvider + ?Sized,
{
    config.validate()?;
    let data = fetch_market_data(provider, positions, window, config, cache).await;
    analyze(positions, &data, config)
}
