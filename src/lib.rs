//! # Riskcast
//!
//! Forecast ensembles and tail-risk metrics for securities and portfolios.
//! This crate bundles the workspace members:
//!
//! - [`forecast_risk`]: sanitizing, forecasting, backtesting, ensembling and
//!   risk measurement
//! - [`trade_math`]: the numeric primitives underneath
//!
//! ## Example
//!
//! ```
//! use riskcast::forecast_risk::risk;
//!
//! assert_eq!(risk::value_at_risk(&[], 1000.0, 0.95), 0.0);
//! assert!(riskcast::Capabilities::probe().allows(riskcast::StrategyKind::LinearTrend));
//! ```

pub use forecast_risk;
pub use trade_math;

pub use forecast_risk::{
    Capabilities, EngineConfig, EnsembleForecast, ForecastError, PortfolioOutcome, PositionInput,
    ReturnSeries, RiskEngine, StrategyKind,
};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_facade_runs_a_forecast() {
        let config = EngineConfig {
            enabled_strategies: vec![StrategyKind::Lag1],
            ..EngineConfig::default()
        };
        let engine = RiskEngine::new(config).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let series = ReturnSeries::daily(start, vec![0.01, -0.02, 0.005, 0.0, 0.012]).unwrap();

        let forecast = engine.forecast(&series, 3);
        assert_eq!(forecast.values, vec![0.012; 3]);
        assert!(trade_math::stats::mean(&forecast.values).is_some());
    }
}
