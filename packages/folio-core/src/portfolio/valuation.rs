//! Position and portfolio valuation in the reporting currency.

use crate::fx::{convert_amount, RateTable};
use crate::report::{Omission, Stage};
use crate::types::{Currency, NormalizedSeries, Position};
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Valuation of one position, all amounts in the reporting currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Valuation {
    pub ticker: String,
    pub shares: f64,
    /// Latest close, converted
    pub latest_price: f64,
    /// Date of the latest close
    pub price_date: NaiveDate,
    /// Average cost per share, converted once
    pub avg_cost: f64,
    pub market_value: f64,
    pub cost_value: f64,
    pub unrealized_pnl: f64,
    /// `unrealized_pnl / cost_value`; `None` when the cost is zero
    pub unrealized_pnl_pct: Option<f64>,
}

impl Valuation {
    /// Value a position from its latest normalized close.
    ///
    /// `avg_cost` must already be in the reporting currency.
    pub fn new(position: &Position, latest_price: f64, price_date: NaiveDate, avg_cost: f64) -> Self {
        let market_value = position.shares * latest_price;
        let cost_value = position.shares * avg_cost;
        let unrealized_pnl = market_value - cost_value;
        let unrealized_pnl_pct = if cost_value != 0.0 {
            Some(unrealized_pnl / cost_value)
        } else {
            None
        };

        Self {
            ticker: position.ticker.clone(),
            shares: position.shares,
            latest_price,
            price_date,
            avg_cost,
            market_value,
            cost_value,
            unrealized_pnl,
            unrealized_pnl_pct,
        }
    }

    pub fn is_profitable(&self) -> bool {
        self.unrealized_pnl > 0.0
    }
}

/// Aggregate valuation of every position that could be valued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioValuation {
    pub reporting_currency: Currency,
    pub positions: Vec<Valuation>,
    pub total_market_value: f64,
    pub total_cost_value: f64,
    pub total_unrealized_pnl: f64,
    /// Aggregate pnl / aggregate cost; `None` when nothing was valued
    pub total_unrealized_pnl_pct: Option<f64>,
    /// Tickers held with zero shares, left out of every total
    pub closed_positions: Vec<String>,
    /// Positions that could not be valued, with the reason
    pub omissions: Vec<Omission>,
}

impl PortfolioValuation {
    /// Sum a set of per-position valuations.
    pub fn from_valuations(
        reporting_currency: Currency,
        positions: Vec<Valuation>,
        closed_positions: Vec<String>,
        omissions: Vec<Omission>,
    ) -> Self {
        let total_market_value: f64 = positions.iter().map(|v| v.market_value).sum();
        let total_cost_value: f64 = positions.iter().map(|v| v.cost_value).sum();
        let total_unrealized_pnl = total_market_value - total_cost_value;
        let total_unrealized_pnl_pct = if total_cost_value != 0.0 {
            Some(total_unrealized_pnl / total_cost_value)
        } else {
            None
        };

        Self {
            reporting_currency,
            positions,
            total_market_value,
            total_cost_value,
            total_unrealized_pnl,
            total_unrealized_pnl_pct,
            closed_positions,
            omissions,
        }
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn find(&self, ticker: &str) -> Option<&Valuation> {
        let ticker = ticker.to_uppercase();
        self.positions.iter().find(|v| v.ticker == ticker)
    }

    /// Market-value weight of each valued position.
    pub fn weights(&self) -> Vec<(String, f64)> {
        if self.total_market_value <= 0.0 {
            return Vec::new();
        }

        self.positions
            .iter()
            .map(|v| (v.ticker.clone(), v.market_value / self.total_market_value))
            .collect()
    }

    /// Whether any position was left out for lack of data.
    pub fn is_partial(&self) -> bool {
        !self.omissions.is_empty()
    }
}

/// Value every active position against its normalized price series.
///
/// Zero-share positions are listed as closed and skipped. A position with no
/// usable price series, or whose cost cannot be converted, is recorded as an
/// omission; the remaining positions are still valued and summed.
pub fn value_positions(
    positions: &[Position],
    prices: &HashMap<String, NormalizedSeries>,
    rates: &RateTable,
    reporting: Currency,
) -> PortfolioValuation {
    let mut valuations = Vec::with_capacity(positions.len());
    let mut closed = Vec::new();
    let mut omissions = Vec::new();

    for position in positions {
        if !position.is_active() {
            closed.push(position.ticker.clone());
            continue;
        }

        match value_position(position, prices.get(&position.ticker), rates, reporting) {
            Ok(valuation) => valuations.push(valuation),
            Err(e) => {
                tracing::warn!("Excluding {} from valuation: {}", position.ticker, e);
                omissions.push(Omission::from_error(&position.ticker, Stage::Valuation, &e));
            }
        }
    }

    let valuation = PortfolioValuation::from_valuations(reporting, valuations, closed, omissions);
    tracing::info!(
        "Valued {} positions: market value {:.2} {}, pnl {:.2}",
        valuation.position_count(),
        valuation.total_market_value,
        reporting,
        valuation.total_unrealized_pnl
    );
    valuation
}

fn value_position(
    position: &Position,
    series: Option<&NormalizedSeries>,
    rates: &RateTable,
    reporting: Currency,
) -> Result<Valuation> {
    let latest = series
        .and_then(|s| s.latest())
        .ok_or_else(|| Error::PositionValuation {
            ticker: position.ticker.clone(),
            reason: "no price available in the reporting currency".to_string(),
        })?;

    let avg_cost = convert_amount(
        position.avg_cost,
        position.cost_currency,
        reporting,
        position.cost_date,
        rates,
    )
    .map_err(|e| Error::PositionValuation {
        ticker: position.ticker.clone(),
        reason: format!("cannot convert cost basis: {e}"),
    })?;

    Ok(Valuation::new(position, latest.close, latest.date, avg_cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::{normalize, RateHistory};
    use crate::types::{CurrencyPair, FxRate, PriceSeries};
    use crate::ErrorKind;
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
    }

    fn jpy_prices(ticker: &str, closes: &[f64]) -> NormalizedSeries {
        let pairs = closes
            .iter()
            .enumerate()
            .map(|(i, c)| (d(i as u32 + 1), *c))
            .collect::<Vec<_>>();
        let raw = PriceSeries::from_pairs(ticker, Currency::JPY, pairs).unwrap();
        normalize(&raw, Currency::JPY, &RateTable::new()).unwrap()
    }

    fn price_map(series: Vec<NormalizedSeries>) -> HashMap<String, NormalizedSeries> {
        series
            .into_iter()
            .map(|s| (s.ticker().to_string(), s))
            .collect()
    }

    #[test]
    fn test_valuation_new() {
        let pos = Position::new("AAPL", 10.0, 150.0, Currency::USD).unwrap();
        let v = Valuation::new(&pos, 175.0, d(1), 150.0);

        assert_eq!(v.market_value, 1750.0);
        assert_eq!(v.cost_value, 1500.0);
        assert_eq!(v.unrealized_pnl, 250.0);
        // 250 / 1500 = 16.67%
        assert_relative_eq!(v.unrealized_pnl_pct.unwrap(), 1.0 / 6.0);
        assert!(v.is_profitable());
    }

    #[test]
    fn test_portfolio_totals() {
        let positions = vec![
            Position::new("7203.T", 100.0, 2500.0, Currency::JPY).unwrap(),
            Position::new("6758.T", 10.0, 13000.0, Currency::JPY).unwrap(),
        ];
        let prices = price_map(vec![
            jpy_prices("7203.T", &[2600.0, 2700.0]),
            jpy_prices("6758.T", &[12500.0, 12000.0]),
        ]);

        let valuation = value_positions(&positions, &prices, &RateTable::new(), Currency::JPY);

        assert_eq!(valuation.position_count(), 2);
        assert_eq!(valuation.total_market_value, 270_000.0 + 120_000.0);
        assert_eq!(valuation.total_cost_value, 250_000.0 + 130_000.0);
        assert_eq!(valuation.total_unrealized_pnl, 10_000.0);
        assert_relative_eq!(
            valuation.total_unrealized_pnl_pct.unwrap(),
            10_000.0 / 380_000.0
        );
        assert!(!valuation.is_partial());
        assert_eq!(valuation.find("7203.t").unwrap().price_date, d(2));
    }

    #[test]
    fn test_zero_share_positions_excluded_from_totals() {
        let positions = vec![
            Position::new("A", 10.0, 100.0, Currency::JPY).unwrap(),
            Position::new("B", 0.0, 100.0, Currency::JPY).unwrap(),
        ];
        let prices = price_map(vec![jpy_prices("A", &[110.0]), jpy_prices("B", &[500.0])]);

        let valuation = value_positions(&positions, &prices, &RateTable::new(), Currency::JPY);

        assert_eq!(valuation.position_count(), 1);
        assert_eq!(valuation.total_market_value, 1100.0);
        assert_eq!(valuation.total_cost_value, 1000.0);
        assert_eq!(valuation.closed_positions, vec!["B".to_string()]);
        assert!(valuation.omissions.is_empty());
    }

    #[test]
    fn test_missing_price_is_recorded_not_dropped() {
        let positions = vec![
            Position::new("A", 10.0, 100.0, Currency::JPY).unwrap(),
            Position::new("GONE", 5.0, 100.0, Currency::JPY).unwrap(),
        ];
        let prices = price_map(vec![jpy_prices("A", &[100.0])]);

        let valuation = value_positions(&positions, &prices, &RateTable::new(), Currency::JPY);

        assert_eq!(valuation.position_count(), 1);
        assert_eq!(valuation.total_market_value, 1000.0);
        assert!(valuation.is_partial());
        assert_eq!(valuation.omissions.len(), 1);
        assert_eq!(valuation.omissions[0].subject, "GONE");
        assert_eq!(valuation.omissions[0].kind, ErrorKind::PositionValuation);
        assert_eq!(valuation.omissions[0].stage, Stage::Valuation);
    }

    #[test]
    fn test_cost_converted_at_cost_date_rate() {
        let pair = CurrencyPair::new(Currency::USD, Currency::JPY);
        let rates = RateTable::new().with(
            RateHistory::historical(
                pair,
                &[FxRate::new(pair, d(1), 140.0), FxRate::new(pair, d(3), 150.0)],
            )
            .unwrap(),
        );
        let usd = PriceSeries::from_pairs("AAPL", Currency::USD, vec![(d(3), 200.0)]).unwrap();
        let prices = price_map(vec![normalize(&usd, Currency::JPY, &rates).unwrap()]);

        let dated = Position::new("AAPL", 1.0, 100.0, Currency::USD)
            .unwrap()
            .with_cost_date(d(2));
        let valuation = value_positions(&[dated], &prices, &rates, Currency::JPY);
        let v = &valuation.positions[0];
        assert_relative_eq!(v.avg_cost, 14_000.0); // rate in force on the 2nd
        assert_relative_eq!(v.market_value, 30_000.0);

        let undated = Position::new("AAPL", 1.0, 100.0, Currency::USD).unwrap();
        let valuation = value_positions(&[undated], &prices, &rates, Currency::JPY);
        assert_relative_eq!(valuation.positions[0].avg_cost, 15_000.0); // latest rate
    }

    #[test]
    fn test_unconvertible_cost_is_omission() {
        let positions = vec![Position::new("SAP.DE", 1.0, 100.0, Currency::EUR).unwrap()];
        let prices = price_map(vec![jpy_prices("SAP.DE", &[20_000.0])]);

        let valuation = value_positions(&positions, &prices, &RateTable::new(), Currency::JPY);
        assert_eq!(valuation.position_count(), 0);
        assert_eq!(valuation.omissions[0].kind, ErrorKind::PositionValuation);
        assert!(valuation.total_unrealized_pnl_pct.is_none());
    }

    #[test]
    fn test_weights() {
        let positions = vec![
            Position::new("A", 10.0, 100.0, Currency::JPY).unwrap(),
            Position::new("B", 30.0, 100.0, Currency::JPY).unwrap(),
        ];
        let prices = price_map(vec![jpy_prices("A", &[100.0]), jpy_prices("B", &[100.0])]);
        let valuation = value_positions(&positions, &prices, &RateTable::new(), Currency::JPY);

        let weights = valuation.weights();
        assert_eq!(weights.len(), 2);
        assert_relative_eq!(weights[0].1, 0.25);
        assert_relative_eq!(weights[1].1, 0.75);
    }
}
