//! Correlation and stress testing.

use crate::config::{StressConfig, TRADING_DAYS_PER_YEAR};
use crate::returns::AlignedReturnMatrix;
use serde::{Deserialize, Serialize};

/// Sigma multiples for the stressed loss scenarios.
const SCENARIO_SIGMAS: [(&str, f64); 4] = [
    ("1 sigma", 1.0),
    ("95% (1.96 sigma)", 1.96),
    ("99% (2.58 sigma)", 2.58),
    ("3 sigma", 3.0),
];

/// Pairwise correlation of ticker returns.
///
/// Each pair is measured over the dates where both tickers have a return.
/// A cell is `None` when a pair shares fewer than two dates or either side
/// has no spread over them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationMatrix {
    pub tickers: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        self.values[i][j]
    }

    /// Mean of the defined off-diagonal cells.
    pub fn average_off_diagonal(&self) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (i, row) in self.values.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                if i < j {
                    if let Some(v) = value {
                        sum += v;
                        count += 1;
                    }
                }
            }
        }
        (count > 0).then(|| sum / count as f64)
    }
}

/// Build the pairwise-complete correlation matrix of a return matrix.
pub fn correlation_matrix(matrix: &AlignedReturnMatrix) -> CorrelationMatrix {
    let columns: Vec<&[Option<f64>]> = matrix.columns().map(|(_, c)| c).collect();
    let n = columns.len();
    let mut values = vec![vec![None; n]; n];

    for i in 0..n {
        values[i][i] = Some(1.0);
        for j in (i + 1)..n {
            let corr = pearson(columns[i], columns[j]);
            values[i][j] = corr;
            values[j][i] = corr;
        }
    }

    CorrelationMatrix {
        tickers: matrix.tickers().to_vec(),
        values,
    }
}

fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    Some((cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0))
}

/// One stressed loss scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StressScenario {
    pub label: String,
    pub sigmas: f64,
    /// Loss in the reporting currency over one day
    pub loss: f64,
    pub loss_pct: f64,
}

/// Portfolio volatility under normal and stressed assumptions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StressTestResult {
    /// Annualized, from observed volatilities and correlations
    pub normal_volatility: f64,
    /// Annualized, with scaled volatilities and shocked correlations
    pub stressed_volatility: f64,
    /// `stressed / normal`; `None` when normal volatility is zero
    pub volatility_multiplier: Option<f64>,
    pub volatility_factor: f64,
    pub correlation_shock: f64,
    pub scenarios: Vec<StressScenario>,
}

/// Run the stress test over per-asset annualized volatilities.
///
/// # Arguments
///
/// * `weights` - Portfolio weights, in `correlation.tickers` order
/// * `volatilities` - Annualized volatilities, same order
/// * `correlation` - Observed correlations; undefined pairs count as zero
/// * `config` - Volatility factor and correlation shock
/// * `portfolio_value` - Value the scenario losses apply to
///
/// # Returns
///
/// `None` when there are no weighted assets.
pub fn stress_test(
    weights: &[f64],
    volatilities: &[f64],
    correlation: &CorrelationMatrix,
    config: &StressConfig,
    portfolio_value: f64,
) -> Option<StressTestResult> {
    let n = weights.len();
    if n == 0 || volatilities.len() != n || correlation.values.len() != n {
        return None;
    }

    let normal_volatility = portfolio_volatility(weights, volatilities, |i, j| {
        if i == j {
            1.0
        } else {
            correlation.values[i][j].unwrap_or(0.0)
        }
    });

    let stressed_vols: Vec<f64> = volatilities
        .iter()
        .map(|v| v * config.volatility_factor)
        .collect();
    let stressed_volatility = portfolio_volatility(weights, &stressed_vols, |i, j| {
        if i == j {
            1.0
        } else {
            config.correlation_shock
        }
    });

    let volatility_multiplier =
        (normal_volatility > 0.0).then(|| stressed_volatility / normal_volatility);

    let stressed_daily = stressed_volatility / TRADING_DAYS_PER_YEAR.sqrt();
    let scenarios = SCENARIO_SIGMAS
        .iter()
        .map(|(label, sigmas)| {
            let loss_pct = sigmas * stressed_daily;
            StressScenario {
                label: label.to_string(),
                sigmas: *sigmas,
                loss: loss_pct * portfolio_value,
                loss_pct,
            }
        })
        .collect();

    Some(StressTestResult {
        normal_volatility,
        stressed_volatility,
        volatility_multiplier,
        volatility_factor: config.volatility_factor,
        correlation_shock: config.correlation_shock,
        scenarios,
    })
}

/// `sqrt(Σ Σ wᵢ wⱼ σᵢ σⱼ ρᵢⱼ)`.
fn portfolio_volatility(weights: &[f64], vols: &[f64], rho: impl Fn(usize, usize) -> f64) -> f64 {
    let mut variance = 0.0;
    for i in 0..weights.len() {
        for j in 0..weights.len() {
            variance += weights[i] * weights[j] * vols[i] * vols[j] * rho(i, j);
        }
    }
    variance.max(0.0).sqrt()
}
