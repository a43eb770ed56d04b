//! CSV position loader.
//!
//! Accepted headers (case-insensitive, any order):
//!
//! - `Ticker,Shares,AvgCost[,Currency][,CostDate]`
//! - `Ticker,Shares,AvgCostJPY`, the cost currency taken from the header suffix
//!
//! Without a currency column or suffix, the cost currency is inferred from the
//! ticker's exchange suffix. Bad rows are rejected one by one.

use crate::report::{Omission, Stage};
use crate::types::{Currency, Position};
use crate::{Error, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A row that could not be turned into a position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordError {
    /// 1-based line in the input, header included
    pub line: u64,
    pub reason: String,
}

impl RecordError {
    pub fn to_error(&self) -> Error {
        Error::MalformedRecord {
            line: self.line,
            reason: self.reason.clone(),
        }
    }
}

/// Positions read from a file, plus the rows that were rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoadedPositions {
    pub positions: Vec<Position>,
    pub rejected: Vec<RecordError>,
}

impl LoadedPositions {
    /// Rejected rows as load-stage omissions.
    pub fn omissions(&self) -> Vec<Omission> {
        self.rejected
            .iter()
            .map(|r| Omission::from_error(format!("line {}", r.line), Stage::Load, &r.to_error()))
            .collect()
    }
}

/// Column positions resolved from the header row.
struct Columns {
    ticker: usize,
    shares: usize,
    avg_cost: usize,
    currency: Option<usize>,
    cost_date: Option<usize>,
    /// Currency named by a legacy `AvgCost<CCY>` header
    header_currency: Option<Currency>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim().to_lowercase().replace(['_', ' '], ""))
            .collect();
        let find = |name: &str| names.iter().position(|n| n == name);
        let missing = |name: &str| Error::MalformedRecord {
            line: 1,
            reason: format!("missing required column {name}"),
        };

        let ticker = find("ticker").ok_or_else(|| missing("Ticker"))?;
        let shares = find("shares").ok_or_else(|| missing("Shares"))?;

        let (avg_cost, header_currency) = match find("avgcost") {
            Some(idx) => (idx, None),
            None => {
                let (idx, suffix) = names
                    .iter()
                    .enumerate()
                    .find_map(|(i, n)| n.strip_prefix("avgcost").map(|s| (i, s)))
                    .ok_or_else(|| missing("AvgCost"))?;
                let currency = suffix.parse::<Currency>().map_err(|_| Error::MalformedRecord {
                    line: 1,
                    reason: format!("unknown currency in cost column header: {}", &headers[idx]),
                })?;
                (idx, Some(currency))
            }
        };

        Ok(Self {
            ticker,
            shares,
            avg_cost,
            currency: find("currency"),
            cost_date: find("costdate"),
            header_currency,
        })
    }

    fn parse(&self, record: &StringRecord) -> std::result::Result<Position, String> {
        let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

        let ticker = field(self.ticker);
        if ticker.is_empty() {
            return Err("ticker is empty".to_string());
        }

        let shares: f64 = field(self.shares)
            .parse()
            .map_err(|_| format!("shares is not a number: {:?}", field(self.shares)))?;
        let avg_cost: f64 = field(self.avg_cost)
            .parse()
            .map_err(|_| format!("average cost is not a number: {:?}", field(self.avg_cost)))?;

        let currency = match self.currency.map(field).filter(|c| !c.is_empty()) {
            Some(code) => code.parse::<Currency>().map_err(|e| e.to_string())?,
            None => self
                .header_currency
                .unwrap_or_else(|| Currency::from_ticker(ticker)),
        };

        let mut position =
            Position::new(ticker, shares, avg_cost, currency).map_err(|e| e.to_string())?;

        if let Some(raw) = self.cost_date.map(field).filter(|d| !d.is_empty()) {
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| format!("cost date is not YYYY-MM-DD: {raw:?}"))?;
            position = position.with_cost_date(date);
        }

        Ok(position)
    }
}

/// Read positions from CSV text.
///
/// # Errors
///
/// Whole-input failures only: unreadable input or a header without the
/// required columns. Row problems are listed in `rejected`.
pub fn load_positions<R: Read>(reader: R) -> Result<LoadedPositions> {
    let mut csv = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);
    let columns = Columns::from_headers(csv.headers()?)?;

    let mut loaded = LoadedPositions::default();
    for result in csv.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                loaded.rejected.push(RecordError {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let outcome = columns
            .parse(&record)
            .and_then(|position| merge(&mut loaded.positions, position));
        if let Err(reason) = outcome {
            tracing::warn!("Rejected position on line {}: {}", line, reason);
            loaded.rejected.push(RecordError { line, reason });
        }
    }

    tracing::info!(
        "Loaded {} positions ({} rows rejected)",
        loaded.positions.len(),
        loaded.rejected.len()
    );
    Ok(loaded)
}

/// Read positions from a CSV file.
pub fn load_positions_from_path(path: &Path) -> Result<LoadedPositions> {
    let file = File::open(path)?;
    load_positions(file)
}

/// Add a position, cost-averaging into an existing one for the same ticker.
fn merge(positions: &mut Vec<Position>, position: Position) -> std::result::Result<(), String> {
    let Some(existing) = positions.iter_mut().find(|p| p.ticker == position.ticker) else {
        positions.push(position);
        return Ok(());
    };

    if existing.cost_currency != position.cost_currency {
        return Err(format!(
            "{} already held with cost in {}, cannot add a lot in {}",
            position.ticker, existing.cost_currency, position.cost_currency
        ));
    }

    let total_shares = existing.shares + position.shares;
    if total_shares > 0.0 {
        existing.avg_cost = (existing.shares * existing.avg_cost
            + position.shares * position.avg_cost)
            / total_shares;
    }
    existing.shares = total_shares;
    if existing.cost_date != position.cost_date {
        existing.cost_date = None;
    }
    Ok(())
}
