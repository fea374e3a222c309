//! Degree-1 trend extrapolation
//!
//! The fallback of last resort for every heavier strategy, so it has to
//! work on any non-empty history.

use crate::error::{ForecastError, Result};
use crate::models::{check_horizon, ForecastModel, ForecastResult, StrategyKind};
use crate::series::ReturnSeries;
use trade_math::LinearFit;

/// Histories shorter than this repeat the last value instead of fitting a line
pub const MIN_TREND_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrendModel;

impl LinearTrendModel {
    /// Predict `horizon` values following `history`
    pub fn extrapolate(history: &[f64], horizon: usize) -> Result<Vec<f64>> {
        let Some(&last) = history.last() else {
            return Err(ForecastError::InsufficientData(
                "Linear trend needs at least one observation".to_string(),
            ));
        };
        if history.len() < MIN_TREND_POINTS {
            return Ok(vec![last; horizon]);
        }

        let fit = LinearFit::fit(history)?;
        Ok((1..=horizon).map(|step| fit.forecast(step)).collect())
    }

    /// One-step-ahead prediction used by the walk-forward backtester
    pub fn predict_next(history: &[f64]) -> Result<f64> {
        let next = Self::extrapolate(history, 1)?;
        next.first().copied().ok_or_else(|| {
            ForecastError::InsufficientData("Linear trend produced no prediction".to_string())
        })
    }
}

impl ForecastModel for LinearTrendModel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LinearTrend
    }

    fn forecast(&self, series: &ReturnSeries, horizon: usize) -> Result<ForecastResult> {
        check_horizon(horizon)?;
        let values = Self::extrapolate(series.values(), horizon)?;
        ForecastResult::new(StrategyKind::LinearTrend, values, horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_extrapolates_line() {
        let values = LinearTrendModel::extrapolate(&[0.01, 0.02, 0.03, 0.04], 2).unwrap();
        assert_relative_eq!(values[0], 0.05, epsilon = 1e-12);
        assert_relative_eq!(values[1], 0.06, epsilon = 1e-12);
    }

    #[test]
    fn test_short_history_repeats_last_value() {
        assert_eq!(
            LinearTrendModel::extrapolate(&[0.3, -0.1], 3).unwrap(),
            vec![-0.1; 3]
        );
        assert!(LinearTrendModel::extrapolate(&[], 3).is_err());
        assert_relative_eq!(LinearTrendModel::predict_next(&[0.2]).unwrap(), 0.2);
    }
}
