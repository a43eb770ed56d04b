//! Portfolio valuation and analytics.
//!
//! Provides position valuation, performance analytics, and risk metrics.

mod performance;
mod risk;
mod stress;
mod valuation;

pub use performance::{
    position_weights, region_allocation, region_allocation_with_countries, ConcentrationAnalysis,
    PortfolioSummary, PositionPnl, Region, RegionAllocation,
};
pub use risk::{
    calculate_max_drawdown, calculate_risk_report, conditional_var, excess_kurtosis,
    historical_var, mean, norm_ppf, parametric_var, portfolio_returns, quantile, sample_std,
    sample_variance, sharpe_ratio, skewness, sortino_ratio, volatility, AssetRisk, RiskReport,
    ScaledRisk, ScaledTail, TailRisk,
};
pub use stress::{
    correlation_matrix, stress_test, CorrelationMatrix, StressScenario, StressTestResult,
};
pub use valuation::{value_positions, PortfolioValuation, Valuation};
