//! Forecasting strategies for return series
//!
//! Every strategy answers the same question: given a cleaned
//! [`ReturnSeries`], what are the next `horizon` returns? Strategies are a
//! closed set, enumerated by [`StrategyKind`] and dispatched through
//! [`Strategy`], so the combiner can iterate an enabled set without boxing.

use crate::config::{Capabilities, EngineConfig};
use crate::error::{ForecastError, Result};
use crate::series::ReturnSeries;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod arima;
pub mod baseline;
pub mod garch;
pub mod linear_trend;
pub mod neural;
pub mod random_forest;
pub mod seasonal;

pub use arima::ArimaModel;
pub use baseline::{Lag1Model, NaiveZeroModel};
pub use garch::{GarchModel, GarchVariant};
pub use linear_trend::LinearTrendModel;
pub use neural::NeuralModel;
pub use random_forest::{LagRegressor, RandomForestModel, TrainedForest};
pub use seasonal::SeasonalModel;

/// Identifier of a forecasting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    NaiveZero,
    Lag1,
    LinearTrend,
    RandomForest,
    Arima,
    Garch,
    Neural,
    Seasonal,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 8] = [
        StrategyKind::NaiveZero,
        StrategyKind::Lag1,
        StrategyKind::LinearTrend,
        StrategyKind::RandomForest,
        StrategyKind::Arima,
        StrategyKind::Garch,
        StrategyKind::Neural,
        StrategyKind::Seasonal,
    ];

    /// Stable identifier used in configuration and serialized output
    pub fn id(self) -> &'static str {
        match self {
            StrategyKind::NaiveZero => "naive_zero",
            StrategyKind::Lag1 => "lag1",
            StrategyKind::LinearTrend => "linear_trend",
            StrategyKind::RandomForest => "random_forest",
            StrategyKind::Arima => "arima",
            StrategyKind::Garch => "garch",
            StrategyKind::Neural => "neural",
            StrategyKind::Seasonal => "seasonal",
        }
    }

    /// Whether the strategy predicts returns. The volatility model predicts
    /// a volatility path instead and is never blended into a return forecast.
    pub fn forecasts_returns(self) -> bool {
        !matches!(self, StrategyKind::Garch)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for StrategyKind {
    type Err = ForecastError;

    /// Accepts the snake_case ids as well as the model names the service
    /// environment uses (`RandomForest`, `Trend`, `LSTM`, `Prophet`, ...).
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "naivezero" | "naive" | "zero" => Ok(StrategyKind::NaiveZero),
            "lag1" => Ok(StrategyKind::Lag1),
            "lineartrend" | "trend" => Ok(StrategyKind::LinearTrend),
            "randomforest" | "rf" => Ok(StrategyKind::RandomForest),
            "arima" => Ok(StrategyKind::Arima),
            "garch" | "volatility" => Ok(StrategyKind::Garch),
            "neural" | "lstm" => Ok(StrategyKind::Neural),
            "seasonal" | "prophet" => Ok(StrategyKind::Seasonal),
            _ => Err(ForecastError::InvalidParameter(format!(
                "Unknown strategy '{}'",
                s.trim()
            ))),
        }
    }
}

/// Forecast produced by one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    strategy: StrategyKind,
    values: Vec<f64>,
    /// Set when the strategy could not run itself and a simpler one produced the values
    fallback: Option<StrategyKind>,
}

impl ForecastResult {
    /// Create a new forecast result, checking the length against `horizon`
    pub fn new(strategy: StrategyKind, values: Vec<f64>, horizon: usize) -> Result<Self> {
        if values.len() != horizon {
            return Err(ForecastError::InvalidParameter(format!(
                "Values length ({}) doesn't match horizon ({})",
                values.len(),
                horizon
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::DataQuality(format!(
                "{} produced a non-finite forecast",
                strategy
            )));
        }

        Ok(Self {
            strategy,
            values,
            fallback: None,
        })
    }

    /// Mark the values as produced by `fallback` on behalf of this strategy
    pub fn with_fallback(mut self, fallback: StrategyKind) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn horizon(&self) -> usize {
        self.values.len()
    }

    pub fn fallback(&self) -> Option<StrategyKind> {
        self.fallback
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Mean predicted value, 0 for an empty forecast
    pub fn mean(&self) -> f64 {
        trade_math::stats::mean(&self.values).unwrap_or(0.0)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A forecasting strategy
pub trait ForecastModel: fmt::Debug + Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Predict the next `horizon` values. Never mutates `series`.
    fn forecast(&self, series: &ReturnSeries, horizon: usize) -> Result<ForecastResult>;

    /// Whether the strategy's dependencies are present
    fn is_available(&self, capabilities: &Capabilities) -> bool {
        capabilities.allows(self.kind())
    }
}

/// Closed set of configured strategies
#[derive(Debug, Clone)]
pub enum Strategy {
    NaiveZero(NaiveZeroModel),
    Lag1(Lag1Model),
    LinearTrend(LinearTrendModel),
    RandomForest(RandomForestModel),
    Arima(ArimaModel),
    Garch(GarchModel),
    Neural(NeuralModel),
    Seasonal(SeasonalModel),
}

impl Strategy {
    /// Build the strategy for `kind` with its parameters taken from `config`
    pub fn from_config(kind: StrategyKind, config: &EngineConfig) -> Self {
        match kind {
            StrategyKind::NaiveZero => Strategy::NaiveZero(NaiveZeroModel),
            StrategyKind::Lag1 => Strategy::Lag1(Lag1Model),
            StrategyKind::LinearTrend => Strategy::LinearTrend(LinearTrendModel),
            StrategyKind::RandomForest => {
                Strategy::RandomForest(RandomForestModel::new(config.random_forest.clone()))
            }
            StrategyKind::Arima => Strategy::Arima(ArimaModel::new(config.arima.orders.clone())),
            StrategyKind::Garch => Strategy::Garch(GarchModel::default()),
            StrategyKind::Neural => Strategy::Neural(NeuralModel::new(config.neural.clone())),
            StrategyKind::Seasonal => Strategy::Seasonal(SeasonalModel::new(config.seasonal.clone())),
        }
    }

    fn inner(&self) -> &dyn ForecastModel {
        match self {
            Strategy::NaiveZero(m) => m,
            Strategy::Lag1(m) => m,
            Strategy::LinearTrend(m) => m,
            Strategy::RandomForest(m) => m,
            Strategy::Arima(m) => m,
            Strategy::Garch(m) => m,
            Strategy::Neural(m) => m,
            Strategy::Seasonal(m) => m,
        }
    }
}

impl ForecastModel for Strategy {
    fn kind(&self) -> StrategyKind {
        self.inner().kind()
    }

    fn forecast(&self, series: &ReturnSeries, horizon: usize) -> Result<ForecastResult> {
        self.inner().forecast(series, horizon)
    }

    fn is_available(&self, capabilities: &Capabilities) -> bool {
        self.inner().is_available(capabilities)
    }
}

/// Shared precondition of every strategy
pub(crate) fn check_horizon(horizon: usize) -> Result<()> {
    if horizon == 0 {
        return Err(ForecastError::InvalidParameter(
            "Forecast horizon must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("random_forest", StrategyKind::RandomForest)]
    #[case("RandomForest", StrategyKind::RandomForest)]
    #[case("Trend", StrategyKind::LinearTrend)]
    #[case(" Lag1 ", StrategyKind::Lag1)]
    #[case("LSTM", StrategyKind::Neural)]
    #[case("Prophet", StrategyKind::Seasonal)]
    #[case("ARIMA", StrategyKind::Arima)]
    fn test_parse_strategy_names(#[case] input: &str, #[case] expected: StrategyKind) {
        assert_eq!(input.parse::<StrategyKind>().unwrap(), expected);
    }

    #[test]
    fn test_ids_round_trip_through_from_str() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.id().parse::<StrategyKind>().unwrap(), kind);
        }
        assert!("xgboost".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_forecast_result_checks_length() {
        assert!(ForecastResult::new(StrategyKind::Lag1, vec![0.1; 3], 4).is_err());
        assert!(ForecastResult::new(StrategyKind::Lag1, vec![f64::NAN], 1).is_err());

        let result = ForecastResult::new(StrategyKind::Neural, vec![0.0; 2], 2)
            .unwrap()
            .with_fallback(StrategyKind::LinearTrend);
        assert_eq!(result.fallback(), Some(StrategyKind::LinearTrend));
        assert!(result.to_json().unwrap().contains("\"neural\""));
    }
}
