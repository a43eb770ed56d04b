//! Portfolio performance analytics.
//!
//! Summary statistics, concentration and regional breakdowns computed from a
//! [`PortfolioValuation`]. All amounts are in the reporting currency.

use super::valuation::{PortfolioValuation, Valuation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Portfolio performance summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSummary {
    /// Number of valued positions
    pub position_count: usize,
    /// Number of positions with gains
    pub profitable_positions: usize,
    /// Number of positions without gains
    pub losing_positions: usize,
    /// Share of valued positions in profit (0.0 - 1.0)
    pub win_rate: f64,
    /// Position with the largest unrealized gain
    pub best_position: Option<PositionPnl>,
    /// Position with the largest unrealized loss
    pub worst_position: Option<PositionPnl>,
    /// Total cost basis divided by position count
    pub average_position_cost: f64,
}

/// Ticker and unrealized P&L of one position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionPnl {
    pub ticker: String,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_pct: Option<f64>,
}

impl From<&Valuation> for PositionPnl {
    fn from(v: &Valuation) -> Self {
        Self {
            ticker: v.ticker.clone(),
            unrealized_pnl: v.unrealized_pnl,
            unrealized_pnl_pct: v.unrealized_pnl_pct,
        }
    }
}

impl PortfolioSummary {
    /// Calculate summary metrics from a valuation.
    pub fn from_valuation(valuation: &PortfolioValuation) -> Self {
        let position_count = valuation.positions.len();
        let profitable_positions = valuation
            .positions
            .iter()
            .filter(|v| v.is_profitable())
            .count();

        let win_rate = if position_count > 0 {
            profitable_positions as f64 / position_count as f64
        } else {
            0.0
        };

        let best_position = valuation
            .positions
            .iter()
            .max_by(|a, b| a.unrealized_pnl.total_cmp(&b.unrealized_pnl))
            .map(PositionPnl::from);
        let worst_position = valuation
            .positions
            .iter()
            .min_by(|a, b| a.unrealized_pnl.total_cmp(&b.unrealized_pnl))
            .map(PositionPnl::from);

        let average_position_cost = if position_count > 0 {
            valuation.total_cost_value / position_count as f64
        } else {
            0.0
        };

        Self {
            position_count,
            profitable_positions,
            losing_positions: position_count - profitable_positions,
            win_rate,
            best_position,
            worst_position,
            average_position_cost,
        }
    }
}

/// How concentrated the portfolio is in its largest positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcentrationAnalysis {
    /// Market-value weights, largest first
    pub weights: Vec<(String, f64)>,
    /// Combined weight of the five largest positions
    pub top_5_weight: f64,
    /// Combined weight of the ten largest positions
    pub top_10_weight: f64,
    /// Herfindahl-Hirschman index, sum of squared weights (1/n to 1.0)
    pub herfindahl_index: f64,
    /// Weight each position would have if equally weighted
    pub equal_weight: f64,
    pub largest_position: (String, f64),
    pub smallest_position: (String, f64),
}

impl ConcentrationAnalysis {
    /// Concentration figures, `None` when nothing has a positive market value.
    pub fn from_valuation(valuation: &PortfolioValuation) -> Option<Self> {
        let mut weights = position_weights(valuation);
        if weights.is_empty() {
            return None;
        }
        weights.sort_by(|a, b| b.1.total_cmp(&a.1));

        let top_5_weight = weights.iter().take(5).map(|(_, w)| w).sum();
        let top_10_weight = weights.iter().take(10).map(|(_, w)| w).sum();
        let herfindahl_index = weights.iter().map(|(_, w)| w * w).sum();
        let equal_weight = 1.0 / weights.len() as f64;
        let largest_position = weights.first()?.clone();
        let smallest_position = weights.last()?.clone();

        Some(Self {
            weights,
            top_5_weight,
            top_10_weight,
            herfindahl_index,
            equal_weight,
            largest_position,
            smallest_position,
        })
    }
}

/// Calculate weight of each position in the portfolio.
pub fn position_weights(valuation: &PortfolioValuation) -> Vec<(String, f64)> {
    valuation.weights()
}

/// Geographic region of a holding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Japan,
    UnitedStates,
    Europe,
    AsiaPacific,
    NorthAmericaOther,
    Other,
}

const EUROPEAN_COUNTRIES: &[&str] = &[
    "GERMANY", "FRANCE", "UNITED KINGDOM", "UK", "GREAT BRITAIN", "ITALY", "SPAIN",
    "NETHERLANDS", "SWITZERLAND", "SWEDEN", "NORWAY", "DENMARK", "FINLAND", "BELGIUM",
    "AUSTRIA", "IRELAND", "PORTUGAL", "LUXEMBOURG", "GREECE", "POLAND", "CZECH REPUBLIC",
    "HUNGARY", "SLOVAKIA", "SLOVENIA", "CROATIA", "ROMANIA", "BULGARIA", "ESTONIA", "LATVIA",
    "LITHUANIA", "MALTA", "CYPRUS",
];

const ASIA_PACIFIC_COUNTRIES: &[&str] = &[
    "CHINA", "SOUTH KOREA", "KOREA", "TAIWAN", "HONG KONG", "SINGAPORE", "MALAYSIA",
    "THAILAND", "INDONESIA", "PHILIPPINES", "VIETNAM", "INDIA", "AUSTRALIA", "NEW ZEALAND",
];

impl Region {
    /// Region of the exchange a ticker is listed on.
    ///
    /// Tickers without a suffix, or with a share-class suffix such as
    /// `BRK.B`, are US listings. Unrecognized exchange suffixes are `Other`.
    pub fn from_ticker(ticker: &str) -> Region {
        let upper = ticker.trim().to_uppercase();
        let suffix = match upper.rsplit_once('.') {
            Some((_, suffix)) => suffix,
            None => return Region::UnitedStates,
        };

        match suffix {
            "T" | "JP" => Region::Japan,
            "A" | "B" | "C" | "US" => Region::UnitedStates,
            "AS" | "PA" | "DE" | "MI" | "MC" | "BR" | "L" | "SW" | "ST" | "OL" | "CO" | "HE"
            | "IR" | "LS" | "VI" => Region::Europe,
            "TO" | "V" => Region::NorthAmericaOther,
            "AX" | "HK" | "SI" | "SS" | "SZ" | "KS" | "KQ" | "NS" | "BO" | "NZ" | "TW" | "KL"
            | "BK" | "JK" => Region::AsiaPacific,
            _ => Region::Other,
        }
    }

    /// Region of a company's home country, as reported by a data vendor.
    pub fn from_country(country: &str) -> Region {
        let country = country.trim().to_uppercase();
        match country.as_str() {
            "" => Region::Other,
            "JAPAN" => Region::Japan,
            "UNITED STATES" | "USA" | "US" => Region::UnitedStates,
            "CANADA" => Region::NorthAmericaOther,
            c if EUROPEAN_COUNTRIES.contains(&c) => Region::Europe,
            c if ASIA_PACIFIC_COUNTRIES.contains(&c) => Region::AsiaPacific,
            _ => Region::Other,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::Japan => "Japan",
            Region::UnitedStates => "United States",
            Region::Europe => "Europe",
            Region::AsiaPacific => "Asia-Pacific",
            Region::NorthAmericaOther => "North America (other)",
            Region::Other => "Other",
        };
        write!(f, "{name}")
    }
}

/// Valued positions grouped by region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionAllocation {
    pub region: Region,
    pub position_count: usize,
    pub market_value: f64,
    pub cost_value: f64,
    pub unrealized_pnl: f64,
    /// Share of total market value (0.0 - 1.0)
    pub allocation: f64,
    pub unrealized_pnl_pct: Option<f64>,
}

/// Group a valuation by listing region, largest allocation first.
pub fn region_allocation(valuation: &PortfolioValuation) -> Vec<RegionAllocation> {
    region_allocation_with_countries(valuation, &HashMap::new())
}

/// Group a valuation by region, using each ticker's home country when known
/// and its listing suffix otherwise.
pub fn region_allocation_with_countries(
    valuation: &PortfolioValuation,
    countries: &HashMap<String, String>,
) -> Vec<RegionAllocation> {
    let mut groups: Vec<RegionAllocation> = Vec::new();

    for v in &valuation.positions {
        let region = match countries.get(&v.ticker) {
            Some(country) => Region::from_country(country),
            None => Region::from_ticker(&v.ticker),
        };
        let idx = match groups.iter().position(|g| g.region == region) {
            Some(idx) => idx,
            None => {
                groups.push(RegionAllocation {
                    region,
                    position_count: 0,
                    market_value: 0.0,
                    cost_value: 0.0,
                    unrealized_pnl: 0.0,
                    allocation: 0.0,
                    unrealized_pnl_pct: None,
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[idx];
        group.position_count += 1;
        group.market_value += v.market_value;
        group.cost_value += v.cost_value;
        group.unrealized_pnl += v.unrealized_pnl;
    }

    let total = valuation.total_market_value;
    for group in &mut groups {
        group.allocation = if total > 0.0 {
            group.market_value / total
        } else {
            0.0
        };
        group.unrealized_pnl_pct =
            (group.cost_value != 0.0).then(|| group.unrealized_pnl / group.cost_value);
    }

    groups.sort_by(|a, b| {
        b.allocation
            .total_cmp(&a.allocation)
            .then(a.region.cmp(&b.region))
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, Position};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn valued(ticker: &str, shares: f64, cost: f64, price: f64) -> Valuation {
        let pos = Position::new(ticker, shares, cost, Currency::JPY).unwrap();
        Valuation::new(&pos, price, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(), cost)
    }

    fn portfolio(positions: Vec<Valuation>) -> PortfolioValuation {
        PortfolioValuation::from_valuations(Currency::JPY, positions, Vec::new(), Vec::new())
    }

    #[test]
    fn test_portfolio_summary() {
        let valuation = portfolio(vec![
            valued("AAPL", 10.0, 150.0, 175.0),  // +250
            valued("GOOGL", 5.0, 100.0, 90.0),   // -50
            valued("7203.T", 100.0, 20.0, 20.0), // flat
        ]);

        let summary = PortfolioSummary::from_valuation(&valuation);

        assert_eq!(summary.position_count, 3);
        assert_eq!(summary.profitable_positions, 1);
        assert_eq!(summary.losing_positions, 2); // flat counts as not profitable
        assert_relative_eq!(summary.win_rate, 1.0 / 3.0);
        assert_eq!(summary.best_position.unwrap().ticker, "AAPL");
        assert_eq!(summary.worst_position.unwrap().unrealized_pnl, -50.0);
        // (1500 + 500 + 2000) / 3
        assert_relative_eq!(summary.average_position_cost, 4000.0 / 3.0);
    }

    #[test]
    fn test_empty_summary() {
        let summary = PortfolioSummary::from_valuation(&portfolio(Vec::new()));
        assert_eq!(summary.position_count, 0);
        assert_eq!(summary.win_rate, 0.0);
        assert!(summary.best_position.is_none());
    }

    #[test]
    fn test_position_weights() {
        let valuation = portfolio(vec![
            valued("AAPL", 10.0, 100.0, 100.0), // 1000
            valued("GOOGL", 10.0, 100.0, 100.0), // 1000
        ]);

        let weights = position_weights(&valuation);

        assert_eq!(weights.len(), 2);
        assert!((weights[0].1 - 0.5).abs() < 0.01); // 50% each
        assert!((weights[1].1 - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_concentration() {
        let valuation = portfolio(vec![
            valued("A", 60.0, 10.0, 10.0),
            valued("B", 30.0, 10.0, 10.0),
            valued("C", 10.0, 10.0, 10.0),
        ]);

        let c = ConcentrationAnalysis::from_valuation(&valuation).unwrap();

        assert_eq!(c.largest_position.0, "A");
        assert_eq!(c.smallest_position.0, "C");
        assert_relative_eq!(c.top_5_weight, 1.0);
        assert_relative_eq!(c.herfindahl_index, 0.36 + 0.09 + 0.01, epsilon = 1e-12);
        assert_relative_eq!(c.equal_weight, 1.0 / 3.0);
        assert!(ConcentrationAnalysis::from_valuation(&portfolio(Vec::new())).is_none());
    }

    #[test]
    fn test_top_five_of_many() {
        let positions = (0..12)
            .map(|i| valued(&format!("T{i}"), 1.0, 10.0, 10.0))
            .collect();
        let c = ConcentrationAnalysis::from_valuation(&portfolio(positions)).unwrap();
        assert_relative_eq!(c.top_5_weight, 5.0 / 12.0, epsilon = 1e-12);
        assert_relative_eq!(c.top_10_weight, 10.0 / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_region_from_ticker() {
        assert_eq!(Region::from_ticker("7203.T"), Region::Japan);
        assert_eq!(Region::from_ticker("AAPL"), Region::UnitedStates);
        assert_eq!(Region::from_ticker("ASML.AS"), Region::Europe);
        assert_eq!(Region::from_ticker("SHOP.TO"), Region::NorthAmericaOther);
        assert_eq!(Region::from_ticker("0700.HK"), Region::AsiaPacific);
        assert_eq!(Region::from_ticker("BRK.B"), Region::UnitedStates);
        assert_eq!(Region::AsiaPacific.to_string(), "Asia-Pacific");
    }

    #[test]
    fn test_non_us_suffixes() {
        for ticker in ["RELIANCE.NS", "500325.BO", "035720.KQ", "FPH.NZ", "2330.TW"] {
            assert_eq!(Region::from_ticker(ticker), Region::AsiaPacific, "{ticker}");
        }
        for ticker in ["VOLV-B.ST", "EQNR.OL", "NOVO-B.CO", "ITX.MC"] {
            assert_eq!(Region::from_ticker(ticker), Region::Europe, "{ticker}");
        }
        assert_eq!(Region::from_ticker("PETR4.SA"), Region::Other);
        assert_eq!(Region::Other.to_string(), "Other");
    }

    #[test]
    fn test_region_from_country() {
        assert_eq!(Region::from_country("Japan"), Region::Japan);
        assert_eq!(Region::from_country(" united states "), Region::UnitedStates);
        assert_eq!(Region::from_country("Netherlands"), Region::Europe);
        assert_eq!(Region::from_country("Taiwan"), Region::AsiaPacific);
        assert_eq!(Region::from_country("Canada"), Region::NorthAmericaOther);
        assert_eq!(Region::from_country("Brazil"), Region::Other);
        assert_eq!(Region::from_country(""), Region::Other);
    }

    #[test]
    fn test_country_overrides_listing() {
        // A Dutch company listed in New York.
        let valuation = portfolio(vec![
            valued("ASML", 10.0, 100.0, 100.0),
            valued("AAPL", 10.0, 100.0, 100.0),
        ]);
        let countries = HashMap::from([("ASML".to_string(), "Netherlands".to_string())]);

        let regions = region_allocation_with_countries(&valuation, &countries);

        assert_eq!(regions.len(), 2);
        assert!(regions
            .iter()
            .any(|r| r.region == Region::Europe && r.position_count == 1));
    }

    #[test]
    fn test_region_allocation() {
        let valuation = portfolio(vec![
            valued("7203.T", 100.0, 20.0, 30.0), // 3000, cost 2000
            valued("6758.T", 10.0, 100.0, 100.0), // 1000
            valued("AAPL", 10.0, 150.0, 100.0),   // 1000, cost 1500
        ]);

        let regions = region_allocation(&valuation);

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].region, Region::Japan);
        assert_eq!(regions[0].position_count, 2);
        assert_relative_eq!(regions[0].allocation, 0.8);
        assert_relative_eq!(regions[0].unrealized_pnl_pct.unwrap(), 1000.0 / 3000.0);
        assert_eq!(regions[1].region, Region::UnitedStates);
        assert_relative_eq!(regions[1].unrealized_pnl, -500.0);
    }
}
