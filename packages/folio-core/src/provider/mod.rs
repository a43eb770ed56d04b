//! Market data providers and the fetch stage.
//!
//! A provider answers single-ticker and single-pair requests; [`fetch_market_data`]
//! fans those out concurrently and turns failures into omissions.

mod csv_dir;
mod fetch;
mod memory;

pub use csv_dir::CsvDirectoryProvider;
pub use fetch::{fetch_market_data, MarketData};
pub use memory::InMemoryProvider;

use crate::types::{CurrencyPair, FxRate, PriceSeries};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Source of daily closes and FX rates.
///
/// Missing data is reported as `Error::NotFound`.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily closes for `ticker` in its native currency, `start..=end`.
    async fn price_history(&self, ticker: &str, start: NaiveDate, end: NaiveDate)
        -> Result<PriceSeries>;

    /// Latest rate for `pair` as of `date`.
    async fn fx_rate(&self, pair: CurrencyPair, date: NaiveDate) -> Result<FxRate>;

    /// Daily rates for `pair` over `start..=end`.
    async fn fx_history(
        &self,
        pair: CurrencyPair,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<FxRate>> {
        Err(Error::NotFound(format!("no rate history for {pair}")))
    }
}
