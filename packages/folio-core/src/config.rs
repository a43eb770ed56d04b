//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so a partial (or missing) file
//! is valid. Default path: `~/.folio/config.toml`, overridable with the
//! `FOLIO_CONFIG_FILE` environment variable.

use crate::types::Currency;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Trading days used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Trading days in a month, for monthly horizon scaling.
pub const TRADING_DAYS_PER_MONTH: f64 = 20.0;

/// Configuration for one analysis run.
///
/// Two modeling approximations are fixed behavior rather than options and are
/// documented here so callers see them:
///
/// - FX rates are forward-filled: a date without a quote uses the nearest
///   earlier quote. When a provider only has a spot rate, that rate is applied
///   to the whole history.
/// - Portfolio weights come from the current valuation and are held constant
///   across the lookback window; no rebalancing is simulated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Currency every value is normalized into
    pub reporting_currency: Currency,
    /// VaR/CVaR confidence levels, e.g. `[0.95, 0.99]`
    pub confidence_levels: Vec<f64>,
    /// Maximum number of portfolio returns used for risk metrics
    pub lookback_days: usize,
    /// Minimum number of portfolio returns before risk metrics are reported
    pub min_observations: usize,
    /// Annual risk-free rate used for Sharpe and Sortino ratios
    pub risk_free_rate: f64,
    /// Horizon used when presenting scaled risk figures
    pub horizon: RiskHorizon,
    /// Lifetime of cached FX rates, in seconds
    pub fx_cache_ttl_secs: u64,
    pub fetch: FetchConfig,
    pub stress: StressConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reporting_currency: Currency::JPY,
            confidence_levels: vec![0.95, 0.99],
            lookback_days: 252,
            min_observations: 20,
            risk_free_rate: 0.001,
            horizon: RiskHorizon::Daily,
            fx_cache_ttl_secs: 3600,
            fetch: FetchConfig::default(),
            stress: StressConfig::default(),
        }
    }
}

/// Market data fetch stage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound on provider requests in flight
    pub max_concurrent_requests: usize,
    /// Per-request timeout, in milliseconds
    pub request_timeout_ms: u64,
    /// Calendar days of history requested per ticker
    pub history_days: i64,
    /// Extra calendar days of FX history requested before the window start,
    /// so the first prices have a quote to forward-fill from
    pub fx_lookback_days: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 4,
            request_timeout_ms: 10_000,
            history_days: 380,
            fx_lookback_days: 10,
        }
    }
}

/// Stress scenario parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StressConfig {
    /// Multiplier applied to every asset volatility
    pub volatility_factor: f64,
    /// Correlation assumed between every pair of assets under stress
    pub correlation_shock: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            volatility_factor: 1.5,
            correlation_shock: 0.8,
        }
    }
}

/// Time horizon for presenting risk figures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskHorizon {
    Daily,
    Monthly,
    Annual,
}

impl RiskHorizon {
    /// Square-root-of-time factor applied to one-day figures.
    pub fn scale_factor(&self) -> f64 {
        match self {
            RiskHorizon::Daily => 1.0,
            RiskHorizon::Monthly => TRADING_DAYS_PER_MONTH.sqrt(),
            RiskHorizon::Annual => TRADING_DAYS_PER_YEAR.sqrt(),
        }
    }

    /// Number of trading days covered by the horizon.
    pub fn trading_days(&self) -> f64 {
        match self {
            RiskHorizon::Daily => 1.0,
            RiskHorizon::Monthly => TRADING_DAYS_PER_MONTH,
            RiskHorizon::Annual => TRADING_DAYS_PER_YEAR,
        }
    }
}

impl std::str::FromStr for RiskHorizon {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(RiskHorizon::Daily),
            "monthly" | "month" | "m" => Ok(RiskHorizon::Monthly),
            "annual" | "yearly" | "year" | "y" => Ok(RiskHorizon::Annual),
            other => Err(Error::InvalidConfig(format!("unknown horizon: {other}"))),
        }
    }
}

impl EngineConfig {
    /// Get the default config file path.
    ///
    /// Default path: `~/.folio/config.toml`
    /// Can be overridden with `FOLIO_CONFIG_FILE` environment variable.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var("FOLIO_CONFIG_FILE") {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".folio/config.toml"))
            .unwrap_or_else(|| PathBuf::from("folio.toml"))
    }

    /// Load from the default path, falling back to defaults when absent.
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path())
    }

    /// Load and validate a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.confidence_levels.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one confidence level is required".to_string(),
            ));
        }
        if let Some(bad) = self
            .confidence_levels
            .iter()
            .find(|c| !(c.is_finite() && **c > 0.0 && **c < 1.0))
        {
            return Err(Error::InvalidConfig(format!(
                "confidence level must lie strictly between 0 and 1, got {bad}"
            )));
        }
        if self.min_observations < 2 {
            return Err(Error::InvalidConfig(
                "min_observations must be at least 2".to_string(),
            ));
        }
        if self.lookback_days < self.min_observations {
            return Err(Error::InvalidConfig(format!(
                "lookback_days ({}) is shorter than min_observations ({})",
                self.lookback_days, self.min_observations
            )));
        }
        if self.fetch.max_concurrent_requests == 0 {
            return Err(Error::InvalidConfig(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.fetch.history_days <= 0 {
            return Err(Error::InvalidConfig(
                "history_days must be positive".to_string(),
            ));
        }
        if self.fetch.fx_lookback_days < 0 {
            return Err(Error::InvalidConfig(
                "fx_lookback_days must not be negative".to_string(),
            ));
        }
        if self.stress.volatility_factor <= 0.0 || !(-1.0..=1.0).contains(&self.stress.correlation_shock)
        {
            return Err(Error::InvalidConfig(
                "stress factor must be positive and correlation shock within [-1, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Confidence levels sorted ascending with duplicates removed.
    pub fn sorted_confidence_levels(&self) -> Vec<f64> {
        let mut levels = self.confidence_levels.clone();
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup();
        levels
    }

    /// Horizon for scaled risk: the requested one, else the configured one.
    pub fn horizon_or(&self, requested: Option<RiskHorizon>) -> RiskHorizon {
        requested.unwrap_or(self.horizon)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch.request_timeout_ms)
    }

    pub fn fx_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.fx_cache_ttl_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.reporting_currency, Currency::JPY);
        assert_eq!(config.confidence_levels, vec![0.95, 0.99]);
        assert_eq!(config.lookback_days, 252);
        assert_eq!(config.min_observations, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            reporting_currency = "USD"
            min_observations = 30

            [fetch]
            max_concurrent_requests = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.reporting_currency, Currency::USD);
        assert_eq!(config.min_observations, 30);
        assert_eq!(config.fetch.max_concurrent_requests, 8);
        assert_eq!(config.fetch.request_timeout_ms, 10_000);
        assert_eq!(config.confidence_levels, vec![0.95, 0.99]);
    }

    #[test]
    fn test_invalid_confidence_rejected() {
        let result = EngineConfig::from_toml("confidence_levels = [0.95, 1.0]");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = EngineConfig::from_toml("confidence_levels = []");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = EngineConfig::from_toml("[fetch]\nmax_concurrent_requests = 0");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_fx_lookback() {
        assert_eq!(EngineConfig::default().fetch.fx_lookback_days, 10);
        let result = EngineConfig::from_toml("[fetch]\nfx_lookback_days = -1");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_currency_is_parse_error() {
        let result = EngineConfig::from_toml("reporting_currency = \"XXX\"");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "horizon = \"monthly\"\nlookback_days = 126").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.horizon, RiskHorizon::Monthly);
        assert_eq!(config.lookback_days, 126);
        assert_eq!(config.horizon_or(None), RiskHorizon::Monthly);
        assert_eq!(config.horizon_or(Some(RiskHorizon::Annual)), RiskHorizon::Annual);
    }

    #[test]
    fn test_horizon_scale_factor() {
        assert_eq!(RiskHorizon::Daily.scale_factor(), 1.0);
        assert!((RiskHorizon::Monthly.scale_factor() - 20f64.sqrt()).abs() < 1e-12);
        assert!((RiskHorizon::Annual.scale_factor() - 252f64.sqrt()).abs() < 1e-12);
        assert_eq!("annual".parse::<RiskHorizon>().unwrap(), RiskHorizon::Annual);
    }

    #[test]
    fn test_sorted_confidence_levels() {
        let config = EngineConfig {
            confidence_levels: vec![0.99, 0.95, 0.99],
            ..Default::default()
        };
        assert_eq!(config.sorted_confidence_levels(), vec![0.95, 0.99]);
    }
}
