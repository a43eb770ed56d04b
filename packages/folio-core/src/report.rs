//! Snapshot assembly.
//!
//! A [`PortfolioSnapshot`] is the single value handed to presentation code. It
//! always carries the valuation; risk may be unavailable, in which case the
//! snapshot says why instead of failing.

use crate::fx::RateSource;
use crate::portfolio::{
    ConcentrationAnalysis, PortfolioSummary, PortfolioValuation, RegionAllocation, RiskReport,
};
use crate::types::{Currency, CurrencyPair};
use crate::{Error, ErrorKind, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stage an omission was recorded in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Fetch,
    Normalize,
    Align,
    Valuation,
    Risk,
}

/// A ticker, currency pair or record left out of the analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Omission {
    /// Ticker, currency pair or record label
    pub subject: String,
    pub stage: Stage,
    pub kind: ErrorKind,
    pub reason: String,
}

impl Omission {
    pub fn new(subject: impl Into<String>, stage: Stage, kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            stage,
            kind,
            reason: reason.into(),
        }
    }

    pub fn from_error(subject: impl Into<String>, stage: Stage, error: &Error) -> Self {
        Self::new(subject, stage, error.kind(), error.to_string())
    }
}

/// FX pair used in the run and how its rates were sourced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FxUsage {
    pub pair: CurrencyPair,
    /// `Spot` means one rate was applied across the whole history
    pub source: RateSource,
}

/// Risk figures, or the reason they could not be produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskOutcome {
    Available(Box<RiskReport>),
    Unavailable { kind: ErrorKind, reason: String },
}

impl RiskOutcome {
    pub fn from_result(result: Result<RiskReport>) -> Self {
        match result {
            Ok(report) => RiskOutcome::Available(Box::new(report)),
            Err(e) => RiskOutcome::Unavailable {
                kind: e.kind(),
                reason: e.to_string(),
            },
        }
    }

    pub fn report(&self) -> Option<&RiskReport> {
        match self {
            RiskOutcome::Available(report) => Some(report),
            RiskOutcome::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, RiskOutcome::Available(_))
    }
}

/// Whether anything was left out of the snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Complete,
    Partial,
}

/// Per-portfolio breakdowns derived from the valuation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioAnalytics {
    pub summary: PortfolioSummary,
    pub concentration: Option<ConcentrationAnalysis>,
    pub regions: Vec<RegionAllocation>,
}

/// Everything the assembler packages.
#[derive(Debug, Clone)]
pub struct SnapshotInputs {
    pub as_of: NaiveDate,
    pub valuation: PortfolioValuation,
    pub analytics: PortfolioAnalytics,
    pub risk: RiskOutcome,
    /// Omissions from stages before valuation (load, fetch, normalize, align)
    pub omissions: Vec<Omission>,
    pub fx: Vec<FxUsage>,
}

/// Immutable result of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSnapshot {
    as_of: NaiveDate,
    generated_at: DateTime<Utc>,
    reporting_currency: Currency,
    status: SnapshotStatus,
    valuation: PortfolioValuation,
    analytics: PortfolioAnalytics,
    risk: RiskOutcome,
    omissions: Vec<Omission>,
    fx: Vec<FxUsage>,
}

impl PortfolioSnapshot {
    /// Date of the most recent price the snapshot is based on.
    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn reporting_currency(&self) -> Currency {
        self.reporting_currency
    }

    pub fn status(&self) -> SnapshotStatus {
        self.status
    }

    pub fn is_partial(&self) -> bool {
        self.status == SnapshotStatus::Partial
    }

    pub fn valuation(&self) -> &PortfolioValuation {
        &self.valuation
    }

    pub fn analytics(&self) -> &PortfolioAnalytics {
        &self.analytics
    }

    pub fn risk(&self) -> &RiskOutcome {
        &self.risk
    }

    /// Every omission across all stages, valuation omissions included.
    pub fn omissions(&self) -> &[Omission] {
        &self.omissions
    }

    /// Omissions concerning one subject.
    pub fn omissions_for<'a>(&'a self, subject: &'a str) -> impl Iterator<Item = &'a Omission> + 'a {
        self.omissions.iter().filter(move |o| o.subject == subject)
    }

    pub fn fx(&self) -> &[FxUsage] {
        &self.fx
    }
}

/// Package the stage outputs into one snapshot.
///
/// The snapshot is partial when risk is unavailable or anything was omitted;
/// the valuation is carried either way.
pub fn assemble(inputs: SnapshotInputs) -> PortfolioSnapshot {
    let SnapshotInputs {
        as_of,
        valuation,
        analytics,
        risk,
        mut omissions,
        fx,
    } = inputs;

    omissions.extend(valuation.omissions.iter().cloned());

    let status = if omissions.is_empty() && risk.is_available() {
        SnapshotStatus::Complete
    } else {
        SnapshotStatus::Partial
    };

    PortfolioSnapshot {
        as_of,
        generated_at: Utc::now(),
        reporting_currency: valuation.reporting_currency,
        status,
        valuation,
        analytics,
        risk,
        omissions,
        fx,
    }
}
