//! File-based market data.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<TICKER>.csv           date,close
//! <root>/fx/<BASE><QUOTE>.csv   date,rate
//! ```

use super::MarketDataProvider;
use crate::types::{Currency, CurrencyPair, FxRate, PriceSeries};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CloseRecord {
    #[serde(alias = "Date")]
    date: NaiveDate,
    #[serde(alias = "Close", alias = "close_price")]
    close: f64,
}

#[derive(Debug, Deserialize)]
struct RateRecord {
    #[serde(alias = "Date")]
    date: NaiveDate,
    #[serde(alias = "Rate")]
    rate: f64,
}

/// Provider reading one CSV file per ticker and per currency pair.
///
/// A ticker's currency comes from an explicit override, else from its
/// exchange suffix.
#[derive(Debug, Clone)]
pub struct CsvDirectoryProvider {
    root: PathBuf,
    currencies: HashMap<String, Currency>,
}

impl CsvDirectoryProvider {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            currencies: HashMap::new(),
        }
    }

    /// Quote `ticker` in `currency` regardless of its suffix.
    pub fn with_currency(mut self, ticker: &str, currency: Currency) -> Self {
        self.currencies.insert(ticker.trim().to_uppercase(), currency);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding `ticker`'s closes. Tickers that could leave the root
    /// directory are rejected.
    fn price_path(&self, ticker: &str) -> Result<PathBuf> {
        let unsafe_name = ticker.is_empty()
            || ticker.contains("..")
            || ticker.chars().any(|c| matches!(c, '/' | '\\' | ':' | '\0'));
        if unsafe_name {
            return Err(Error::InvalidPosition(format!(
                "ticker {ticker:?} is not a valid file name"
            )));
        }
        Ok(self.root.join(format!("{ticker}.csv")))
    }

    fn fx_path(&self, pair: CurrencyPair) -> PathBuf {
        self.root.join("fx").join(format!("{pair}.csv"))
    }

    fn currency_of(&self, ticker: &str) -> Currency {
        self.currencies
            .get(ticker)
            .copied()
            .unwrap_or_else(|| Currency::from_ticker(ticker))
    }

    async fn read_rates(&self, pair: CurrencyPair) -> Result<Vec<FxRate>> {
        // A file for the inverse pair is accepted; rate histories orient it.
        for candidate in [pair, pair.inverse()] {
            if let Some(bytes) = read_if_exists(&self.fx_path(candidate)).await? {
                let mut reader = csv::Reader::from_reader(bytes.as_slice());
                let mut rates = Vec::new();
                for result in reader.deserialize() {
                    let record: RateRecord = result?;
                    rates.push(FxRate::new(candidate, record.date, record.rate));
                }
                return Ok(rates);
            }
        }
        Err(Error::NotFound(format!("no rate file for {pair}")))
    }
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl MarketDataProvider for CsvDirectoryProvider {
    async fn price_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let ticker = ticker.trim().to_uppercase();
        let bytes = read_if_exists(&self.price_path(&ticker)?)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no price file for {ticker}")))?;

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let mut pairs = Vec::new();
        for result in reader.deserialize() {
            let record: CloseRecord = result?;
            if record.date >= start && record.date <= end {
                pairs.push((record.date, record.close));
            }
        }

        tracing::debug!("Read {} closes for {} from disk", pairs.len(), ticker);
        PriceSeries::from_pairs(&ticker, self.currency_of(&ticker), pairs)
    }

    async fn fx_rate(&self, pair: CurrencyPair, date: NaiveDate) -> Result<FxRate> {
        let rates = self.read_rates(pair).await?;
        let latest = rates
            .into_iter()
            .filter(|r| r.date <= date)
            .max_by_key(|r| r.date)
            .ok_or_else(|| Error::NotFound(format!("no {pair} rate on or before {date}")))?;

        Ok(if latest.pair == pair {
            latest
        } else {
            latest.inverse()
        })
    }

    async fn fx_history(
        &self,
        pair: CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FxRate>> {
        let rates = self.read_rates(pair).await?;
        Ok(rates
            .into_iter()
            .filter(|r| r.date >= start && r.date <= end)
            .collect())
    }
}
