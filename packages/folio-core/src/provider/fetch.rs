//! Bounded concurrent fetch of price histories and FX rates.

use super::MarketDataProvider;
use crate::config::EngineConfig;
use crate::engine::DateWindow;
use crate::fx::{FxRateCache, RateHistory, RateTable};
use crate::report::{Omission, Stage};
use crate::types::{Currency, CurrencyPair, Position, PriceSeries};
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Raw inputs for one analysis run.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub window: DateWindow,
    /// Native-currency series, in position order
    pub series: Vec<PriceSeries>,
    pub rates: RateTable,
    /// Tickers and pairs that could not be fetched
    pub omissions: Vec<Omission>,
}

impl MarketData {
    /// Bundle already-fetched inputs.
    pub fn new(window: DateWindow, series: Vec<PriceSeries>, rates: RateTable) -> Self {
        Self {
            window,
            series,
            rates,
            omissions: Vec::new(),
        }
    }
}

/// Run `request` under the configured timeout.
async fn with_timeout<T>(
    request: String,
    timeout: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::ProviderTimeout {
            request,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Fetch everything a run over `positions` needs.
///
/// Price histories for active positions are requested concurrently, at most
/// `max_concurrent_requests` at a time, each bounded by the request timeout.
/// FX pairs needed by the fetched series and by position cost currencies are
/// then resolved over the window widened by `fx_lookback_days`: a fresh cache
/// entry covering that range first, else the provider's dated history, else
/// its spot rate applied to every date. A failed ticker or pair
/// becomes an omission; the fetch itself never fails.
pub async fn fetch_market_data<P>(
    provider: &P,
    positions: &[Position],
    window: DateWindow,
    config: &EngineConfig,
    cache: &mut FxRateCache,
) -> MarketData
where
    P: MarketDataProvider + ?Sized,
{
    let limit = config.fetch.max_concurrent_requests.max(1);
    let timeout = config.request_timeout();
    let reporting = config.reporting_currency;
    let mut omissions = Vec::new();

    let mut seen = HashSet::new();
    let tickers: Vec<String> = positions
        .iter()
        .filter(|p| p.is_active())
        .filter(|p| seen.insert(p.ticker.clone()))
        .map(|p| p.ticker.clone())
        .collect();

    tracing::info!(
        "Fetching {} price histories ({} to {}), {} at a time",
        tickers.len(),
        window.start,
        window.end,
        limit
    );

    let mut fetched: Vec<(usize, String, Result<PriceSeries>)> =
        stream::iter(tickers.into_iter().enumerate())
            .map(|(idx, ticker)| async move {
                let request = format!("price history for {ticker}");
                let result = with_timeout(
                    request,
                    timeout,
                    provider.price_history(&ticker, window.start, window.end),
                )
                .await;
                (idx, ticker, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;
    fetched.sort_by_key(|(idx, _, _)| *idx);

    let mut series = Vec::with_capacity(fetched.len());
    for (_, ticker, result) in fetched {
        match result {
            Ok(s) if s.is_empty() => {
                let e = Error::NotFound(format!("no prices for {ticker} in the window"));
                tracing::warn!("{}", e);
                omissions.push(Omission::from_error(&ticker, Stage::Fetch, &e));
            }
            Ok(s) => series.push(s),
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", ticker, e);
                omissions.push(Omission::from_error(&ticker, Stage::Fetch, &e));
            }
        }
    }

    // FX history reaches back before the window so the first closes have a
    // quote at or before their date.
    let fx_window = DateWindow {
        start: window.start - chrono::Duration::days(config.fetch.fx_lookback_days.max(0)),
        end: window.end,
    };
    let pairs = required_pairs(&series, positions, reporting);
    let mut rates = RateTable::new();
    let mut missing = Vec::new();
    for pair in pairs {
        match cache.get(pair, fx_window.start, fx_window.end) {
            Some(history) => {
                tracing::debug!("FX cache hit for {}", pair);
                rates.insert(history.clone());
            }
            None => missing.push(pair),
        }
    }

    let resolved: Vec<(CurrencyPair, Result<RateHistory>)> = stream::iter(missing)
        .map(|pair| async move { (pair, fetch_rates(provider, pair, fx_window, timeout).await) })
        .buffer_unordered(limit)
        .collect()
        .await;

    for (pair, result) in resolved {
        match result {
            Ok(history) => {
                cache.insert(history.clone(), fx_window.start, fx_window.end);
                rates.insert(history);
            }
            Err(e) => {
                tracing::warn!("No FX rates for {}: {}", pair, e);
                omissions.push(Omission::from_error(pair.to_string(), Stage::Fetch, &e));
            }
        }
    }

    tracing::info!(
        "Fetched {} series and {} FX pairs ({} omissions)",
        series.len(),
        rates.len(),
        omissions.len()
    );

    MarketData {
        window,
        series,
        rates,
        omissions,
    }
}

/// Pairs converting every fetched series and every cost currency into the
/// reporting currency, in first-seen order.
fn required_pairs(
    series: &[PriceSeries],
    positions: &[Position],
    reporting: Currency,
) -> Vec<CurrencyPair> {
    let currencies = series
        .iter()
        .map(|s| s.currency())
        .chain(positions.iter().filter(|p| p.is_active()).map(|p| p.cost_currency));

    let mut seen = HashSet::new();
    currencies
        .filter(|c| *c != reporting)
        .map(|c| CurrencyPair::new(c, reporting))
        .filter(|pair| seen.insert(*pair))
        .collect()
}

async fn fetch_rates<P>(
    provider: &P,
    pair: CurrencyPair,
    window: DateWindow,
    timeout: Duration,
) -> Result<RateHistory>
where
    P: MarketDataProvider + ?Sized,
{
    let history = with_timeout(
        format!("FX history for {pair}"),
        timeout,
        provider.fx_history(pair, window.start, window.end),
    )
    .await;

    match history {
        Ok(rates) if !rates.is_empty() => return RateHistory::historical(pair, &rates),
        Ok(_) => tracing::debug!("Empty FX history for {}", pair),
        Err(e) => tracing::debug!("No FX history for {}: {}", pair, e),
    }

    let spot = with_timeout(
        format!("spot rate for {pair}"),
        timeout,
        provider.fx_rate(pair, window.end),
    )
    .await?;
    tracing::warn!(
        "Using spot rate {} for {} across the whole history",
        spot.rate,
        pair
    );
    RateHistory::spot(spot)
}
