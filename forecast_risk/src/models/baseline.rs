//! Dependency-free baseline strategies

use crate::error::{ForecastError, Result};
use crate::models::{check_horizon, ForecastModel, ForecastResult, StrategyKind};
use crate::series::ReturnSeries;

/// Always predicts a zero return
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveZeroModel;

impl ForecastModel for NaiveZeroModel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NaiveZero
    }

    fn forecast(&self, _series: &ReturnSeries, horizon: usize) -> Result<ForecastResult> {
        check_horizon(horizon)?;
        ForecastResult::new(StrategyKind::NaiveZero, vec![0.0; horizon], horizon)
    }
}

/// Repeats the most recent observed return
#[derive(Debug, Clone, Copy, Default)]
pub struct Lag1Model;

impl Lag1Model {
    /// One-step prediction from a raw history slice
    pub fn predict_next(history: &[f64]) -> Option<f64> {
        history.last().copied()
    }
}

impl ForecastModel for Lag1Model {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lag1
    }

    fn forecast(&self, series: &ReturnSeries, horizon: usize) -> Result<ForecastResult> {
        check_horizon(horizon)?;
        let last = Self::predict_next(series.values()).ok_or_else(|| {
            ForecastError::InsufficientData("Lag-1 needs at least one observation".to_string())
        })?;
        ForecastResult::new(StrategyKind::Lag1, vec![last; horizon], horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn series(values: Vec<f64>) -> ReturnSeries {
        ReturnSeries::daily(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(), values).unwrap()
    }

    #[test]
    fn test_naive_zero() {
        let result = NaiveZeroModel.forecast(&series(vec![0.1, 0.2]), 4).unwrap();
        assert_eq!(result.values(), &[0.0; 4]);
        assert!(NaiveZeroModel.forecast(&series(vec![0.1]), 0).is_err());
    }

    #[test]
    fn test_lag1_repeats_last_value() {
        let s = series(vec![0.01, -0.02, 0.015]);
        let first = Lag1Model.forecast(&s, 3).unwrap();
        let second = Lag1Model.forecast(&s, 3).unwrap();

        assert_eq!(first.values(), &[0.015; 3]);
        assert_eq!(first, second);
        assert!(matches!(
            Lag1Model.forecast(&series(vec![]), 3),
            Err(ForecastError::InsufficientData(_))
        ));
    }
}
