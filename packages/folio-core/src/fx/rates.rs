//! FX rate histories with forward-fill lookup.

use crate::types::{Currency, CurrencyPair, FxRate};
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where the rates of a history came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// A dated series; lookups forward-fill from the nearest earlier quote.
    Historical,
    /// A single spot quote applied uniformly to every date.
    Spot,
}

/// Rates for one currency pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateHistory {
    pair: CurrencyPair,
    source: RateSource,
    /// Sorted by date, one entry per date
    points: Vec<(NaiveDate, f64)>,
}

impl RateHistory {
    /// Build a dated history. Later observations win on duplicate dates.
    pub fn historical(pair: CurrencyPair, rates: &[FxRate]) -> Result<Self> {
        let mut points: Vec<(NaiveDate, f64)> = Vec::with_capacity(rates.len());
        for rate in rates {
            let value = oriented(pair, rate)?;
            points.push((rate.date, value));
        }
        points.sort_by_key(|(date, _)| *date);

        let mut deduped: Vec<(NaiveDate, f64)> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.0 == point.0 => *last = point,
                _ => deduped.push(point),
            }
        }

        if deduped.is_empty() {
            return Err(Error::NotFound(format!("no FX observations for {pair}")));
        }

        Ok(Self {
            pair,
            source: RateSource::Historical,
            points: deduped,
        })
    }

    /// Wrap a spot quote; it applies to every date, past or future.
    pub fn spot(rate: FxRate) -> Result<Self> {
        let value = oriented(rate.pair, &rate)?;
        Ok(Self {
            pair: rate.pair,
            source: RateSource::Spot,
            points: vec![(rate.date, value)],
        })
    }

    pub fn pair(&self) -> CurrencyPair {
        self.pair
    }

    pub fn source(&self) -> RateSource {
        self.source
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rate applicable on `date`.
    ///
    /// Historical: the quote on `date` or the nearest earlier one; `None` when
    /// `date` precedes the first quote. Spot: always the spot quote.
    pub fn rate_on(&self, date: NaiveDate) -> Option<f64> {
        match self.source {
            RateSource::Spot => self.points.first().map(|(_, rate)| *rate),
            RateSource::Historical => {
                let idx = self.points.partition_point(|(d, _)| *d <= date);
                if idx == 0 {
                    None
                } else {
                    Some(self.points[idx - 1].1)
                }
            }
        }
    }

    /// Most recent quote.
    pub fn latest(&self) -> Option<(NaiveDate, f64)> {
        self.points.last().copied()
    }
}

/// Orient a quote onto `pair`, inverting it when it is quoted the other way.
fn oriented(pair: CurrencyPair, rate: &FxRate) -> Result<f64> {
    let value = if rate.pair == pair {
        rate.rate
    } else if rate.pair == pair.inverse() {
        1.0 / rate.rate
    } else {
        return Err(Error::Provider(format!(
            "rate for {} supplied where {} was expected",
            rate.pair, pair
        )));
    };

    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Provider(format!(
            "non-positive FX rate for {} on {}: {}",
            rate.pair, rate.date, rate.rate
        )));
    }
    Ok(value)
}

/// All rate histories available to one run.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    histories: HashMap<CurrencyPair, RateHistory>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the history for its pair.
    pub fn insert(&mut self, history: RateHistory) {
        self.histories.insert(history.pair(), history);
    }

    pub fn with(mut self, history: RateHistory) -> Self {
        self.insert(history);
        self
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn histories(&self) -> impl Iterator<Item = &RateHistory> {
        self.histories.values()
    }

    /// Whether `from → to` can be resolved, directly or by inversion.
    pub fn contains(&self, from: Currency, to: Currency) -> bool {
        from == to || self.lookup(CurrencyPair::new(from, to)).is_some()
    }

    /// How `from → to` would be resolved.
    pub fn source(&self, from: Currency, to: Currency) -> Option<RateSource> {
        self.lookup(CurrencyPair::new(from, to))
            .map(|(history, _)| history.source())
    }

    /// Rate converting one unit of `from` into `to` on `date`, forward-filled.
    pub fn rate_on(&self, from: Currency, to: Currency, date: NaiveDate) -> Result<f64> {
        if from == to {
            return Ok(1.0);
        }
        let pair = CurrencyPair::new(from, to);
        let (history, inverted) = self
            .lookup(pair)
            .ok_or(Error::MissingRate { pair, date })?;
        let rate = history
            .rate_on(date)
            .ok_or(Error::MissingRate { pair, date })?;
        Ok(if inverted { 1.0 / rate } else { rate })
    }

    /// Most recent rate converting `from` into `to`.
    pub fn latest_rate(&self, from: Currency, to: Currency) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        let (history, inverted) = self.lookup(CurrencyPair::new(from, to))?;
        history
            .latest()
            .map(|(_, rate)| if inverted { 1.0 / rate } else { rate })
    }

    fn lookup(&self, pair: CurrencyPair) -> Option<(&RateHistory, bool)> {
        if let Some(history) = self.histories.get(&pair) {
            return Some((history, false));
        }
        self.histories
            .get(&pair.inverse())
            .map(|history| (history, true))
    }
}
