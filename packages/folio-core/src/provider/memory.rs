//! In-memory provider for tests and demos.

use super::MarketDataProvider;
use crate::types::{CurrencyPair, FxRate, PriceSeries};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Provider serving preloaded series and rates.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    series: HashMap<String, PriceSeries>,
    spot: HashMap<CurrencyPair, FxRate>,
    fx_history: HashMap<CurrencyPair, Vec<FxRate>>,
    /// Artificial latency per ticker
    delays: HashMap<String, Duration>,
    fx_requests: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.series.insert(series.ticker().to_string(), series);
        self
    }

    pub fn with_spot_rate(mut self, rate: FxRate) -> Self {
        self.spot.insert(rate.pair, rate);
        self
    }

    pub fn with_fx_history(mut self, pair: CurrencyPair, rates: Vec<FxRate>) -> Self {
        self.fx_history.insert(pair, rates);
        self
    }

    /// Delay every price request for `ticker`.
    pub fn with_delay(mut self, ticker: &str, delay: Duration) -> Self {
        self.delays.insert(ticker.trim().to_uppercase(), delay);
        self
    }

    /// Number of FX requests served so far, history and spot combined.
    pub fn fx_requests(&self) -> usize {
        self.fx_requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryProvider {
    async fn price_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let key = ticker.trim().to_uppercase();
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }

        self.series
            .get(&key)
            .map(|s| s.within(start, end))
            .ok_or_else(|| Error::NotFound(format!("no price history for {key}")))
    }

    async fn fx_rate(&self, pair: CurrencyPair, date: NaiveDate) -> Result<FxRate> {
        self.fx_requests.fetch_add(1, Ordering::Relaxed);

        if let Some(rate) = self.spot.get(&pair) {
            return Ok(*rate);
        }
        if let Some(rate) = self.spot.get(&pair.inverse()) {
            return Ok(rate.inverse());
        }

        // Fall back to the last dated quote on or before `date`.
        self.fx_history
            .get(&pair)
            .and_then(|rates| {
                rates
                    .iter()
                    .filter(|r| r.date <= date)
                    .max_by_key(|r| r.date)
                    .copied()
            })
            .ok_or_else(|| Error::NotFound(format!("no spot rate for {pair}")))
    }

    async fn fx_history(
        &self,
        pair: CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FxRate>> {
        self.fx_requests.fetch_add(1, Ordering::Relaxed);

        let rates = self
            .fx_history
            .get(&pair)
            .or_else(|| self.fx_history.get(&pair.inverse()))
            .ok_or_else(|| Error::NotFound(format!("no rate history for {pair}")))?;

        Ok(rates
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Currency;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    #[tokio::test]
    async fn test_price_history_window() {
        let series = PriceSeries::from_pairs(
            "AAPL",
            Currency::USD,
            vec![(d(1), 170.0), (d(2), 171.0), (d(3), 172.0)],
        )
        .unwrap();
        let provider = InMemoryProvider::new().with_series(series);

        let got = provider.price_history("aapl", d(2), d(3)).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got.start_date(), Some(d(2)));

        let missing = provider.price_history("MSFT", d(1), d(3)).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_spot_rate_inverse() {
        let pair = CurrencyPair::new(Currency::USD, Currency::JPY);
        let provider = InMemoryProvider::new().with_spot_rate(FxRate::new(pair, d(1), 150.0));

        let inverse = provider.fx_rate(pair.inverse(), d(5)).await.unwrap();
        assert_eq!(inverse.pair, pair.inverse());
        assert!((inverse.rate - 1.0 / 150.0).abs() < 1e-12);
        assert_eq!(provider.fx_requests(), 1);

        let history = provider.fx_history(pair, d(1), d(5)).await;
        assert!(matches!(history, Err(Error::NotFound(_))));
    }
}
