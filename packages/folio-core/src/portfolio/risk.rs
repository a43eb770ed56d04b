//! Portfolio risk metrics calculation.
//!
//! Provides the value-weighted portfolio return series and, over it,
//! volatility, historical and parametric VaR, CVaR, Sharpe ratio, Sortino ratio,
//! max drawdown and higher moments.

use super::stress::{correlation_matrix, stress_test, CorrelationMatrix, StressTestResult};
use super::valuation::PortfolioValuation;
use crate::config::{EngineConfig, RiskHorizon, TRADING_DAYS_PER_YEAR};
use crate::returns::AlignedReturnMatrix;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tail risk at one confidence level, over a one-day horizon.
///
/// Loss amounts are non-negative and in the reporting currency; the `_pct`
/// fields are the same losses as fractions of the portfolio value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TailRisk {
    /// Confidence level (e.g., 0.95 for 95%)
    pub confidence: f64,
    /// Historical VaR
    pub var: f64,
    pub var_pct: f64,
    /// Conditional VaR (Expected Shortfall)
    pub cvar: f64,
    pub cvar_pct: f64,
    /// Variance-covariance VaR, reported as a cross-check
    pub parametric_var: f64,
    pub parametric_var_pct: f64,
}

/// Per-asset statistics feeding the diversification figures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetRisk {
    /// Annualized volatility per ticker, `None` with fewer than two returns
    pub volatilities: Vec<(String, Option<f64>)>,
    pub correlation: CorrelationMatrix,
    pub average_correlation: Option<f64>,
    /// Weighted average asset volatility over portfolio volatility
    pub diversification_ratio: Option<f64>,
}

/// Portfolio risk figures derived from the aligned return matrix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Number of portfolio returns used
    pub observations: usize,
    /// Market value of the positions that carry return history
    pub portfolio_value: f64,
    /// Constant weights used for the portfolio return series
    pub weights: Vec<(String, f64)>,
    /// Annualized volatility (sample standard deviation × √252)
    pub volatility: f64,
    pub daily_volatility: f64,
    pub mean_daily_return: f64,
    /// One entry per configured confidence level, ascending
    pub tail: Vec<TailRisk>,
    pub skewness: Option<f64>,
    pub excess_kurtosis: Option<f64>,
    pub max_drawdown: f64,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub assets: AssetRisk,
    pub stress: Option<StressTestResult>,
}

impl RiskReport {
    /// Tail figures at a confidence level.
    pub fn tail_at(&self, confidence: f64) -> Option<&TailRisk> {
        self.tail
            .iter()
            .find(|t| (t.confidence - confidence).abs() < 1e-9)
    }

    /// Historical VaR at a configured confidence level.
    pub fn var(&self, confidence: f64) -> Option<f64> {
        self.tail_at(confidence).map(|t| t.var)
    }

    /// CVaR at a configured confidence level.
    pub fn cvar(&self, confidence: f64) -> Option<f64> {
        self.tail_at(confidence).map(|t| t.cvar)
    }

    /// Restate the one-day figures over a longer horizon (square-root-of-time).
    pub fn scaled(&self, horizon: RiskHorizon) -> ScaledRisk {
        let factor = horizon.scale_factor();
        ScaledRisk {
            horizon,
            factor,
            volatility: self.daily_volatility * factor,
            expected_return: self.mean_daily_return * horizon.trading_days(),
            tail: self
                .tail
                .iter()
                .map(|t| ScaledTail {
                    confidence: t.confidence,
                    var: t.var * factor,
                    var_pct: t.var_pct * factor,
                    cvar: t.cvar * factor,
                    cvar_pct: t.cvar_pct * factor,
                })
                .collect(),
        }
    }
}

/// Risk figures restated over a presentation horizon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaledRisk {
    pub horizon: RiskHorizon,
    pub factor: f64,
    pub volatility: f64,
    pub expected_return: f64,
    pub tail: Vec<ScaledTail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaledTail {
    pub confidence: f64,
    pub var: f64,
    pub var_pct: f64,
    pub cvar: f64,
    pub cvar_pct: f64,
}

/// Calculate the risk report for a portfolio.
///
/// # Arguments
///
/// * `matrix` - Aligned daily returns in the reporting currency
/// * `valuation` - Current valuation; its market values fix the weights
/// * `config` - Confidence levels, lookback and minimum observations
///
/// # Returns
///
/// Returns `RiskReport`, or `Error::InsufficientData` when fewer than
/// `config.min_observations` portfolio returns are available.
pub fn calculate_risk_report(
    matrix: &AlignedReturnMatrix,
    valuation: &PortfolioValuation,
    config: &EngineConfig,
) -> Result<RiskReport> {
    let (weights, portfolio_value) = risk_weights(matrix, valuation);

    let mut series = portfolio_returns(matrix, &weights);
    if series.len() > config.lookback_days {
        series.drain(..series.len() - config.lookback_days);
    }

    if series.len() < config.min_observations {
        return Err(Error::InsufficientData {
            required: config.min_observations,
            available: series.len(),
        });
    }

    let returns: Vec<f64> = series.iter().map(|(_, r)| *r).collect();
    let (start_date, end_date) = match (series.first(), series.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => {
            return Err(Error::InsufficientData {
                required: config.min_observations,
                available: 0,
            })
        }
    };

    let daily_volatility = sample_std(&returns).unwrap_or(0.0);
    let volatility = daily_volatility * TRADING_DAYS_PER_YEAR.sqrt();
    let mean_daily_return = mean(&returns).unwrap_or(0.0);

    let tail = config
        .sorted_confidence_levels()
        .into_iter()
        .map(|c| tail_risk(&returns, c, portfolio_value))
        .collect();

    let assets = asset_risk(matrix, &weights, volatility);
    let weight_vec: Vec<f64> = assets
        .correlation
        .tickers
        .iter()
        .map(|t| weight_of(&weights, t))
        .collect();
    let vol_vec: Vec<f64> = assets
        .volatilities
        .iter()
        .map(|(_, v)| v.unwrap_or(0.0))
        .collect();
    let stress = stress_test(
        &weight_vec,
        &vol_vec,
        &assets.correlation,
        &config.stress,
        portfolio_value,
    );

    tracing::info!(
        "Risk over {} returns: vol {:.4}, value {:.2}",
        returns.len(),
        volatility,
        portfolio_value
    );

    Ok(RiskReport {
        start_date,
        end_date,
        observations: returns.len(),
        portfolio_value,
        weights,
        volatility,
        daily_volatility,
        mean_daily_return,
        tail,
        skewness: skewness(&returns),
        excess_kurtosis: excess_kurtosis(&returns),
        max_drawdown: calculate_max_drawdown(&returns),
        sharpe_ratio: sharpe_ratio(&returns, config.risk_free_rate),
        sortino_ratio: sortino_ratio(&returns, config.risk_free_rate),
        assets,
        stress,
    })
}

/// Weights of the valued positions that have a return column, renormalized
/// to sum to one, together with their combined market value.
fn risk_weights(
    matrix: &AlignedReturnMatrix,
    valuation: &PortfolioValuation,
) -> (Vec<(String, f64)>, f64) {
    let held: Vec<(String, f64)> = valuation
        .positions
        .iter()
        .filter(|v| v.market_value > 0.0 && matrix.contains(&v.ticker))
        .map(|v| (v.ticker.clone(), v.market_value))
        .collect();

    let total: f64 = held.iter().map(|(_, mv)| mv).sum();
    if total <= 0.0 {
        return (Vec::new(), 0.0);
    }

    let weights = held
        .into_iter()
        .map(|(ticker, mv)| (ticker, mv / total))
        .collect();
    (weights, total)
}

fn weight_of(weights: &[(String, f64)], ticker: &str) -> f64 {
    weights
        .iter()
        .find(|(t, _)| t == ticker)
        .map(|(_, w)| *w)
        .unwrap_or(0.0)
}

/// Value-weighted portfolio return per date.
///
/// Weights are held constant across the window. A ticker without a return on
/// a date contributes nothing to that date; dates where no weighted ticker has
/// a return are dropped.
pub fn portfolio_returns(
    matrix: &AlignedReturnMatrix,
    weights: &[(String, f64)],
) -> Vec<(NaiveDate, f64)> {
    let lookup: HashMap<&str, f64> = weights.iter().map(|(t, w)| (t.as_str(), *w)).collect();
    let weighted: Vec<(f64, &[Option<f64>])> = matrix
        .columns()
        .filter_map(|(ticker, column)| lookup.get(ticker).map(|w| (*w, column)))
        .collect();

    matrix
        .dates()
        .iter()
        .enumerate()
        .filter_map(|(row, date)| {
            let mut any = false;
            let mut total = 0.0;
            for (weight, column) in &weighted {
                if let Some(r) = column[row] {
                    total += weight * r;
                    any = true;
                }
            }
            any.then_some((*date, total))
        })
        .collect()
}

fn tail_risk(returns: &[f64], confidence: f64, portfolio_value: f64) -> TailRisk {
    let var_pct = historical_var(returns, confidence).unwrap_or(0.0);
    let cvar_pct = conditional_var(returns, confidence).unwrap_or(0.0);
    let parametric_var_pct = parametric_var(returns, confidence).unwrap_or(0.0);

    TailRisk {
        confidence,
        var: var_pct * portfolio_value,
        var_pct,
        cvar: cvar_pct * portfolio_value,
        cvar_pct,
        parametric_var: parametric_var_pct * portfolio_value,
        parametric_var_pct,
    }
}

fn asset_risk(
    matrix: &AlignedReturnMatrix,
    weights: &[(String, f64)],
    portfolio_volatility: f64,
) -> AssetRisk {
    let volatilities: Vec<(String, Option<f64>)> = matrix
        .tickers()
        .iter()
        .map(|t| {
            let vol = sample_std(&matrix.observed(t)).map(|s| s * TRADING_DAYS_PER_YEAR.sqrt());
            (t.clone(), vol)
        })
        .collect();

    let correlation = correlation_matrix(matrix);
    let average_correlation = correlation.average_off_diagonal();

    let weighted_vol: f64 = volatilities
        .iter()
        .map(|(t, v)| weight_of(weights, t) * v.unwrap_or(0.0))
        .sum();
    let diversification_ratio = if portfolio_volatility > 0.0 {
        Some(weighted_vol / portfolio_volatility)
    } else {
        None
    };

    AssetRisk {
        volatilities,
        correlation,
        average_correlation,
        diversification_ratio,
    }
}

/// Loss magnitude of a return: positive for losses, zero otherwise.
fn loss(r: f64) -> f64 {
    if r < 0.0 {
        -r
    } else {
        0.0
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n − 1 denominator) using Welford's update.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, x) in values.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }

    Some((m2 / (values.len() - 1) as f64).max(0.0))
}

/// Sample standard deviation.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Quantile of an ascending-sorted slice.
///
/// Linear interpolation between order statistics: with `h = (n − 1)·p`,
/// `q = x[⌊h⌋] + (h − ⌊h⌋)·(x[⌊h⌋ + 1] − x[⌊h⌋])`.
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }

    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = h - lo as f64;

    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

fn sorted(returns: &[f64]) -> Vec<f64> {
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Historical Value at Risk as a fraction of portfolio value.
///
/// The loss at the `(1 − confidence)` quantile of the empirical return
/// distribution; zero when that quantile is not a loss.
pub fn historical_var(returns: &[f64], confidence: f64) -> Option<f64> {
    quantile(&sorted(returns), 1.0 - confidence).map(loss)
}

/// Conditional VaR (Expected Shortfall) as a fraction of portfolio value.
///
/// Mean loss over every return at or below the VaR quantile. Never less
/// than the historical VaR at the same confidence.
pub fn conditional_var(returns: &[f64], confidence: f64) -> Option<f64> {
    let sorted = sorted(returns);
    let threshold = quantile(&sorted, 1.0 - confidence)?;

    let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= threshold).collect();
    let tail_loss = mean(&tail).map(loss).unwrap_or(0.0);

    // Equal tail values can round the mean a hair above the threshold.
    Some(tail_loss.max(loss(threshold)))
}

/// Parametric (variance-covariance) VaR as a fraction of portfolio value.
///
/// `z(confidence) × daily standard deviation`, assuming normal returns.
pub fn parametric_var(returns: &[f64], confidence: f64) -> Option<f64> {
    let std = sample_std(returns)?;
    Some((norm_ppf(confidence) * std).max(0.0))
}

/// Annualized volatility from daily returns, as a fraction.
pub fn volatility(returns: &[f64]) -> Option<f64> {
    sample_std(returns).map(|s| s * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Adjusted Fisher-Pearson skewness; needs three returns and non-zero spread.
pub fn skewness(returns: &[f64]) -> Option<f64> {
    let n = returns.len();
    if n < 3 {
        return None;
    }
    let m = mean(returns)?;
    let nf = n as f64;
    let m2 = returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / nf;
    let m3 = returns.iter().map(|r| (r - m).powi(3)).sum::<f64>() / nf;
    if m2 <= 0.0 {
        return None;
    }

    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0))
}

/// Bias-corrected excess kurtosis; needs four returns and non-zero spread.
pub fn excess_kurtosis(returns: &[f64]) -> Option<f64> {
    let n = returns.len();
    if n < 4 {
        return None;
    }
    let m = mean(returns)?;
    let nf = n as f64;
    let m2 = returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / nf;
    let m4 = returns.iter().map(|r| (r - m).powi(4)).sum::<f64>() / nf;
    if m2 <= 0.0 {
        return None;
    }

    let g2 = m4 / (m2 * m2) - 3.0;
    Some(((nf + 1.0) * g2 + 6.0) * (nf - 1.0) / ((nf - 2.0) * (nf - 3.0)))
}

/// Calculate maximum drawdown from a series of returns.
///
/// Returns the maximum peak-to-trough decline as a decimal (e.g., 0.15 for 15% drawdown).
pub fn calculate_max_drawdown(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }

    // Build cumulative returns
    let mut cumulative = Vec::with_capacity(returns.len());
    let mut cum = 1.0;
    for r in returns {
        cum *= 1.0 + r;
        cumulative.push(cum);
    }

    let mut running_max = cumulative[0];
    let mut max_drawdown = 0.0;

    for &value in &cumulative {
        if value > running_max {
            running_max = value;
        }
        let drawdown = (running_max - value) / running_max;
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
    }

    max_drawdown
}

/// Calculate Sharpe ratio from returns.
///
/// # Arguments
///
/// * `returns` - Daily returns
/// * `risk_free_rate` - Annual risk-free rate
///
/// # Returns
///
/// Annualized Sharpe ratio, `None` when returns have no spread.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> Option<f64> {
    let mean = mean(returns)?;
    let std = sample_std(returns)?;

    if std <= 0.0 {
        return None;
    }

    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    Some((mean - daily_rf) / std * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Calculate Sortino ratio from returns.
///
/// # Arguments
///
/// * `returns` - Daily returns
/// * `risk_free_rate` - Annual risk-free rate
///
/// # Returns
///
/// Annualized Sortino ratio, `None` when there are no losing days.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> Option<f64> {
    let mean = mean(returns)?;

    // Downside deviation
    let downside: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).copied().collect();
    if downside.is_empty() {
        return None;
    }
    let downside_std =
        (downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64).sqrt();

    if downside_std <= 0.0 {
        return None;
    }

    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    Some((mean - daily_rf) / downside_std * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Inverse cumulative distribution function for standard normal distribution.
///
/// Uses Acklam's algorithm for high accuracy across the full range.
/// Source: https://web.archive.org/web/20151110174102/http://home.online.no/~pjacklam/notes/invnorm/
pub fn norm_ppf(p: f64) -> f64 {
    // Coefficients in rational approximations
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];

    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];

    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];

    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::{normalize, RateTable};
    use crate::portfolio::value_positions;
    use crate::returns::align;
    use crate::types::{Currency, NormalizedSeries, Position, PriceSeries};
    use approx::assert_relative_eq;

    fn sample_returns() -> Vec<f64> {
        vec![
            0.01, -0.005, 0.008, -0.003, 0.012, -0.007, 0.005, 0.002, -0.004, 0.006, 0.003, -0.002,
            0.007, -0.001, 0.004, -0.02, 0.015, -0.012, 0.001, 0.009, -0.03, 0.004,
        ]
    }

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    fn series_from_returns(ticker: &str, start: f64, returns: &[f64]) -> NormalizedSeries {
        let mut price = start;
        let mut pairs = vec![(day(0), price)];
        for (i, r) in returns.iter().enumerate() {
            price *= 1.0 + r;
            pairs.push((day(i + 1), price));
        }
        let raw = PriceSeries::from_pairs(ticker, Currency::JPY, pairs).unwrap();
        normalize(&raw, Currency::JPY, &RateTable::new()).unwrap()
    }

    fn priced(series: &[NormalizedSeries], positions: &[Position]) -> PortfolioValuation {
        let map = series
            .iter()
            .map(|s| (s.ticker().to_string(), s.clone()))
            .collect();
        value_positions(positions, &map, &RateTable::new(), Currency::JPY)
    }

    #[test]
    fn test_norm_ppf() {
        assert!((norm_ppf(0.5)).abs() < 0.001);
        assert!((norm_ppf(0.95) - 1.645).abs() < 0.01);
        assert!((norm_ppf(0.975) - 1.96).abs() < 0.01);
        assert!((norm_ppf(0.99) - 2.326).abs() < 0.01);
        // Symmetry
        assert!((norm_ppf(0.05) + 1.645).abs() < 0.01);
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile(&sorted, 1.0), Some(5.0));
        assert_eq!(quantile(&sorted, 0.5), Some(3.0));
        // h = 4 * 0.1 = 0.4 -> 1 + 0.4 * (2 - 1)
        assert_relative_eq!(quantile(&sorted, 0.1).unwrap(), 1.4);
        // h = 4 * 0.05 = 0.2
        assert_relative_eq!(quantile(&sorted, 0.05).unwrap(), 1.2);
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&sorted, 1.5), None);
    }

    #[test]
    fn test_historical_var_and_cvar_known_values() {
        // 20 returns: -0.10, -0.09, ..., 0.09
        let returns: Vec<f64> = (0..20).map(|i| (i as f64 - 10.0) / 100.0).collect();

        // h = 19 * 0.05 = 0.95 -> -0.10 + 0.95 * 0.01 = -0.0905
        let var95 = historical_var(&returns, 0.95).unwrap();
        assert_relative_eq!(var95, 0.0905, epsilon = 1e-12);

        // Tail = {-0.10} (the only return <= -0.0905)
        let cvar95 = conditional_var(&returns, 0.95).unwrap();
        assert_relative_eq!(cvar95, 0.10, epsilon = 1e-12);

        // h = 19 * 0.01 = 0.19 -> -0.10 + 0.19 * 0.01 = -0.0981
        let var99 = historical_var(&returns, 0.99).unwrap();
        assert_relative_eq!(var99, 0.0981, epsilon = 1e-12);
    }

    #[test]
    fn test_var_is_zero_when_quantile_is_a_gain() {
        let returns = vec![0.01, 0.02, 0.03, 0.04];
        assert_eq!(historical_var(&returns, 0.95), Some(0.0));
        assert_eq!(conditional_var(&returns, 0.95), Some(0.0));
    }

    #[test]
    fn test_cvar_at_least_var() {
        let returns = sample_returns();
        for c in [0.9, 0.95, 0.975, 0.99] {
            let var = historical_var(&returns, c).unwrap();
            let cvar = conditional_var(&returns, c).unwrap();
            assert!(cvar >= var, "cvar {cvar} < var {var} at {c}");
        }
        assert!(historical_var(&returns, 0.99).unwrap() >= historical_var(&returns, 0.95).unwrap());
    }

    #[test]
    fn test_sample_variance_welford() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // Population variance 4, sample variance 32 / 7
        assert_relative_eq!(sample_variance(&values).unwrap(), 32.0 / 7.0, epsilon = 1e-12);
        assert_eq!(sample_variance(&[1.0]), None);
        assert_eq!(sample_std(&[0.0, 0.0, 0.0]), Some(0.0));
    }

    #[test]
    fn test_sample_variance_stable_with_large_offset() {
        let values: Vec<f64> = [4.0, 7.0, 13.0, 16.0].iter().map(|v| v + 1e9).collect();
        assert_relative_eq!(sample_variance(&values).unwrap(), 30.0, epsilon = 1e-6);
    }

    #[test]
    fn test_parametric_var() {
        let returns = sample_returns();
        let std = sample_std(&returns).unwrap();
        let pvar = parametric_var(&returns, 0.95).unwrap();
        assert_relative_eq!(pvar, norm_ppf(0.95) * std, epsilon = 1e-12);
    }

    #[test]
    fn test_volatility_annualized() {
        let returns: Vec<f64> = vec![0.01, -0.01, 0.02, -0.02, 0.01, -0.01, 0.015, -0.015, 0.005, -0.005];
        let vol = volatility(&returns).unwrap();
        let expected = sample_std(&returns).unwrap() * 252f64.sqrt();
        assert_relative_eq!(vol, expected);
        assert!(vol > 0.10 && vol < 0.50);
    }

    #[test]
    fn test_max_drawdown() {
        let returns = vec![0.10, 0.05, -0.15, -0.10, 0.05];
        let mdd = calculate_max_drawdown(&returns);

        // Peak 1.155, trough 1.155 * 0.85 * 0.90 = 0.883 -> ~23.5%
        assert!(mdd > 0.20);
        assert!(mdd < 0.30);
        assert_eq!(calculate_max_drawdown(&[0.01, 0.02, 0.03]), 0.0);
    }

    #[test]
    fn test_sharpe_and_sortino() {
        let up: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 0.002 } else { 0.001 }).collect();
        assert!(sharpe_ratio(&up, 0.0).unwrap() > 0.0);
        assert_eq!(sortino_ratio(&up, 0.0), None); // no losing days

        let flat = vec![0.001; 50];
        assert_eq!(sharpe_ratio(&flat, 0.0), None);

        let mixed = sample_returns();
        assert!(sortino_ratio(&mixed, 0.0).is_some());
    }

    #[test]
    fn test_skewness_and_kurtosis() {
        let symmetric = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        assert_relative_eq!(skewness(&symmetric).unwrap(), 0.0, epsilon = 1e-12);
        assert!(skewness(&[1.0, 2.0]).is_none());
        assert!(excess_kurtosis(&[1.0, 1.0, 1.0, 1.0]).is_none());

        let right_tail = vec![0.0, 0.0, 0.0, 0.0, 10.0];
        assert!(skewness(&right_tail).unwrap() > 0.0);
    }

    #[test]
    fn test_portfolio_returns_constant_weights_and_gaps() {
        let a = series_from_returns("A", 100.0, &[0.10, 0.0]);
        // B misses day 1
        let b = {
            let raw = PriceSeries::from_pairs(
                "B",
                Currency::JPY,
                vec![(day(0), 50.0), (day(2), 55.0)],
            )
            .unwrap();
            normalize(&raw, Currency::JPY, &RateTable::new()).unwrap()
        };
        let matrix = align(&[a, b]).unwrap();
        let weights = vec![("A".to_string(), 0.5), ("B".to_string(), 0.5)];

        let series = portfolio_returns(&matrix, &weights);
        assert_eq!(series.len(), 2); // day 0 has no returns at all
        assert_relative_eq!(series[0].1, 0.5 * 0.10); // B contributes nothing
        assert_relative_eq!(series[1].1, 0.5 * 0.10, epsilon = 1e-12); // A flat, B +10%
    }

    #[test]
    fn test_calculate_risk_report() {
        let returns = sample_returns();
        let reversed: Vec<f64> = returns.iter().rev().copied().collect();
        let series = vec![
            series_from_returns("A", 100.0, &returns),
            series_from_returns("B", 200.0, &reversed),
        ];
        let positions = vec![
            Position::new("A", 10.0, 100.0, Currency::JPY).unwrap(),
            Position::new("B", 5.0, 200.0, Currency::JPY).unwrap(),
        ];
        let valuation = priced(&series, &positions);
        let matrix = align(&series).unwrap();

        let report = calculate_risk_report(&matrix, &valuation, &EngineConfig::default()).unwrap();

        assert_eq!(report.observations, returns.len());
        assert_relative_eq!(report.portfolio_value, valuation.total_market_value);
        assert_relative_eq!(report.weights.iter().map(|(_, w)| w).sum::<f64>(), 1.0);
        assert!(report.volatility > 0.0);
        assert_eq!(report.tail.len(), 2);

        let t95 = report.tail_at(0.95).unwrap();
        let t99 = report.tail_at(0.99).unwrap();
        assert!(t99.var >= t95.var);
        assert!(t95.cvar >= t95.var);
        assert!(t99.cvar >= t99.var);
        assert_relative_eq!(t95.var, t95.var_pct * report.portfolio_value);
        assert_eq!(report.var(0.95), Some(t95.var));
        assert!(report.var(0.90).is_none());

        assert_eq!(report.assets.volatilities.len(), 2);
        assert!(report.assets.diversification_ratio.unwrap() >= 1.0 - 1e-9);
        assert!(report.stress.is_some());
    }

    #[test]
    fn test_insufficient_data() {
        let series = vec![series_from_returns("A", 100.0, &[0.01, 0.02, -0.01])];
        let positions = vec![Position::new("A", 1.0, 100.0, Currency::JPY).unwrap()];
        let valuation = priced(&series, &positions);
        let matrix = align(&series).unwrap();

        let result = calculate_risk_report(&matrix, &valuation, &EngineConfig::default());
        assert!(matches!(
            result,
            Err(Error::InsufficientData { required: 20, available: 3 })
        ));
    }

    #[test]
    fn test_lookback_window_limits_observations() {
        let returns: Vec<f64> = (0..60).map(|i| ((i % 7) as f64 - 3.0) / 100.0).collect();
        let series = vec![series_from_returns("A", 100.0, &returns)];
        let positions = vec![Position::new("A", 1.0, 100.0, Currency::JPY).unwrap()];
        let valuation = priced(&series, &positions);
        let matrix = align(&series).unwrap();
        let config = EngineConfig {
            lookback_days: 30,
            ..Default::default()
        };

        let report = calculate_risk_report(&matrix, &valuation, &config).unwrap();
        assert_eq!(report.observations, 30);
        assert_eq!(report.end_date, day(60));
        assert_eq!(report.start_date, day(31));
    }

    #[test]
    fn test_scaled_risk() {
        let returns = sample_returns();
        let series = vec![series_from_returns("A", 100.0, &returns)];
        let positions = vec![Position::new("A", 10.0, 100.0, Currency::JPY).unwrap()];
        let valuation = priced(&series, &positions);
        let matrix = align(&series).unwrap();
        let report = calculate_risk_report(&matrix, &valuation, &EngineConfig::default()).unwrap();

        let annual = report.scaled(RiskHorizon::Annual);
        assert_relative_eq!(annual.volatility, report.volatility, epsilon = 1e-12);
        assert_relative_eq!(annual.tail[0].var, report.tail[0].var * 252f64.sqrt());

        let daily = report.scaled(RiskHorizon::Daily);
        assert_eq!(daily.tail[1].cvar, report.tail[1].cvar);
    }
}
