//! Core data types for the valuation and risk engine.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO 4217 currency codes accepted by the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CHF,
    CAD,
    AUD,
    NZD,
    SEK,
    NOK,
    DKK,
    HKD,
    SGD,
    CNY,
    KRW,
    INR,
}

impl Currency {
    /// All supported currencies.
    pub const ALL: [Currency; 16] = [
        Currency::USD,
        Currency::EUR,
        Currency::GBP,
        Currency::JPY,
        Currency::CHF,
        Currency::CAD,
        Currency::AUD,
        Currency::NZD,
        Currency::SEK,
        Currency::NOK,
        Currency::DKK,
        Currency::HKD,
        Currency::SGD,
        Currency::CNY,
        Currency::KRW,
        Currency::INR,
    ];

    /// Returns the ISO 4217 3-letter code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::NZD => "NZD",
            Currency::SEK => "SEK",
            Currency::NOK => "NOK",
            Currency::DKK => "DKK",
            Currency::HKD => "HKD",
            Currency::SGD => "SGD",
            Currency::CNY => "CNY",
            Currency::KRW => "KRW",
            Currency::INR => "INR",
        }
    }

    /// Infer the listing currency of a security from its exchange suffix.
    ///
    /// Tickers without a recognized suffix are assumed to be US listings.
    pub fn from_ticker(ticker: &str) -> Currency {
        let upper = ticker.trim().to_uppercase();
        let suffix = match upper.rsplit_once('.') {
            Some((_, suffix)) => suffix,
            None => return Currency::USD,
        };

        match suffix {
            "T" | "JP" => Currency::JPY,
            "L" => Currency::GBP,
            "TO" | "V" => Currency::CAD,
            "AX" => Currency::AUD,
            "HK" => Currency::HKD,
            "DE" | "PA" | "AS" | "MI" | "MC" | "BR" => Currency::EUR,
            "SW" => Currency::CHF,
            "SI" => Currency::SGD,
            "SS" | "SZ" => Currency::CNY,
            "KS" | "KQ" => Currency::KRW,
            "NS" | "BO" => Currency::INR,
            "ST" => Currency::SEK,
            "OL" => Currency::NOK,
            "CO" => Currency::DKK,
            "NZ" => Currency::NZD,
            _ => Currency::USD,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_uppercase();
        Currency::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .ok_or_else(|| Error::UnknownCurrency(s.trim().to_string()))
    }
}

/// A currency pair where one unit of `base` is worth `rate` units of `quote`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyPair {
    pub base: Currency,
    pub quote: Currency,
}

impl CurrencyPair {
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// The pair quoted the other way round.
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote,
            quote: self.base,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = Error;

    /// Accepts `USDJPY`, `USD/JPY` and the Yahoo-style `USDJPY=X`.
    fn from_str(s: &str) -> Result<Self> {
        let cleaned: String = s
            .trim()
            .trim_end_matches("=X")
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        if cleaned.len() != 6 {
            return Err(Error::UnknownCurrency(s.trim().to_string()));
        }
        let base = cleaned[..3].parse()?;
        let quote = cleaned[3..].parse()?;
        Ok(Self::new(base, quote))
    }
}

/// A holding in the portfolio as supplied by the position loader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    /// Ticker symbol (uppercase)
    pub ticker: String,
    /// Number of shares held (fractional allowed, never negative)
    pub shares: f64,
    /// Average cost per share in `cost_currency`
    pub avg_cost: f64,
    /// Currency the average cost is expressed in
    pub cost_currency: Currency,
    /// Date the cost basis was established, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_date: Option<NaiveDate>,
}

impl Position {
    /// Create a validated position.
    ///
    /// Shares must be finite and non-negative; average cost must be finite and positive.
    pub fn new(ticker: &str, shares: f64, avg_cost: f64, cost_currency: Currency) -> Result<Self> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(Error::InvalidPosition("ticker is empty".to_string()));
        }
        if !shares.is_finite() || shares < 0.0 {
            return Err(Error::InvalidPosition(format!(
                "{ticker}: shares must be a non-negative number, got {shares}"
            )));
        }
        if !avg_cost.is_finite() || avg_cost <= 0.0 {
            return Err(Error::InvalidPosition(format!(
                "{ticker}: average cost must be positive, got {avg_cost}"
            )));
        }

        Ok(Self {
            ticker,
            shares,
            avg_cost,
            cost_currency,
            cost_date: None,
        })
    }

    /// Attach the date the cost basis was established.
    pub fn with_cost_date(mut self, date: NaiveDate) -> Self {
        self.cost_date = Some(date);
        self
    }

    /// Positions with zero shares are carried but never valued.
    pub fn is_active(&self) -> bool {
        self.shares > 0.0
    }

    /// Total cost in the cost currency.
    pub fn total_cost(&self) -> f64 {
        self.shares * self.avg_cost
    }
}

/// One daily close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Daily closing prices for one ticker in a single currency.
///
/// Dates are strictly increasing and every close is finite and positive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSeries {
    ticker: String,
    currency: Currency,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, sorting points by date.
    ///
    /// Fails on duplicate dates and on non-finite or non-positive closes.
    pub fn new(ticker: &str, currency: Currency, mut points: Vec<PricePoint>) -> Result<Self> {
        let ticker = ticker.trim().to_uppercase();
        points.sort_by_key(|p| p.date);

        if let Some(bad) = points.iter().find(|p| !p.close.is_finite() || p.close <= 0.0) {
            return Err(Error::InvalidSeries {
                ticker,
                reason: format!("close on {} is not a positive number: {}", bad.date, bad.close),
            });
        }
        if let Some(dup) = points.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(Error::InvalidSeries {
                ticker,
                reason: format!("duplicate observation on {}", dup[0].date),
            });
        }

        Ok(Self {
            ticker,
            currency,
            points,
        })
    }

    /// Convenience constructor from `(date, close)` pairs.
    pub fn from_pairs<I>(ticker: &str, currency: Currency, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let points = pairs
            .into_iter()
            .map(|(date, close)| PricePoint::new(date, close))
            .collect();
        Self::new(ticker, currency, points)
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent observation.
    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Close observed exactly on `date`.
    pub fn price_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| self.points[idx].close)
    }

    /// Restrict the series to `[start, end]`.
    pub fn within(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            ticker: self.ticker.clone(),
            currency: self.currency,
            points: self
                .points
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect(),
        }
    }
}

/// A price series already expressed in the reporting currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedSeries(PriceSeries);

impl NormalizedSeries {
    pub(crate) fn from_series(series: PriceSeries) -> Self {
        Self(series)
    }

    pub fn as_series(&self) -> &PriceSeries {
        &self.0
    }

    pub fn into_inner(self) -> PriceSeries {
        self.0
    }

    pub fn ticker(&self) -> &str {
        self.0.ticker()
    }

    /// The reporting currency.
    pub fn currency(&self) -> Currency {
        self.0.currency()
    }

    pub fn points(&self) -> &[PricePoint] {
        self.0.points()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.0.latest()
    }
}

/// An exchange rate observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FxRate {
    pub pair: CurrencyPair,
    pub date: NaiveDate,
    pub rate: f64,
}

impl FxRate {
    pub fn new(pair: CurrencyPair, date: NaiveDate, rate: f64) -> Self {
        Self { pair, date, rate }
    }

    /// The same observation quoted the other way round.
    pub fn inverse(&self) -> Self {
        Self {
            pair: self.pair.inverse(),
            date: self.date,
            rate: 1.0 / self.rate,
        }
    }
}

/// API response wrapper for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
