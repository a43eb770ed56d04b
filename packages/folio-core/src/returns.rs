//! Alignment of per-ticker returns onto a common trading-date index.

use crate::types::NormalizedSeries;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Daily returns by date (rows) and ticker (columns).
///
/// A `None` cell means the ticker had no observation on that date (or it is
/// the ticker's first observation); it is never a zero return.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignedReturnMatrix {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    /// One column per ticker, each `dates.len()` long
    columns: Vec<Vec<Option<f64>>>,
    /// Tickers dropped for having fewer than two observations
    excluded: Vec<String>,
}

impl AlignedReturnMatrix {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.tickers.iter().any(|t| t == ticker)
    }

    /// The return column for `ticker`, if it has one.
    pub fn column(&self, ticker: &str) -> Option<&[Option<f64>]> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// All columns in ticker order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.tickers
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter().map(Vec::as_slice))
    }

    /// Defined returns of one ticker, in date order.
    pub fn observed(&self, ticker: &str) -> Vec<f64> {
        self.column(ticker)
            .map(|col| col.iter().flatten().copied().collect())
            .unwrap_or_default()
    }
}

/// Build the aligned return matrix from normalized series.
///
/// The row index is the sorted union of every input date. A ticker's return
/// on a date is measured against its closest earlier observation, so gaps in
/// one ticker's calendar never create spurious zeros. Tickers with fewer than
/// two observations get no column and are listed in `excluded`.
///
/// # Errors
///
/// `Error::InsufficientHistory` when no ticker has two observations.
pub fn align(series: &[NormalizedSeries]) -> Result<AlignedReturnMatrix> {
    let dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|s| s.points().iter().map(|p| p.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut seen = HashSet::new();
    let mut tickers = Vec::new();
    let mut columns = Vec::new();
    let mut excluded = Vec::new();

    for s in series {
        if !seen.insert(s.ticker().to_string()) {
            tracing::warn!("Duplicate series for {}, keeping the first", s.ticker());
            continue;
        }
        if s.len() < 2 {
            tracing::debug!("{} has {} observation(s), no returns", s.ticker(), s.len());
            excluded.push(s.ticker().to_string());
            continue;
        }

        let mut column = vec![None; dates.len()];
        for pair in s.points().windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            // Dates come from the union, so the lookup always succeeds.
            if let Ok(row) = dates.binary_search(&cur.date) {
                column[row] = Some((cur.close - prev.close) / prev.close);
            }
        }

        tickers.push(s.ticker().to_string());
        columns.push(column);
    }

    if tickers.is_empty() {
        return Err(Error::InsufficientHistory);
    }

    tracing::debug!(
        "Aligned {} tickers over {} dates ({} excluded)",
        tickers.len(),
        dates.len(),
        excluded.len()
    );

    Ok(AlignedReturnMatrix {
        dates,
        tickers,
        columns,
        excluded,
    })
}
