//! Walk-forward backtesting of one-step-ahead predictions
//!
//! The first `floor(train_fraction · n)` observations form the initial
//! training window. For every `t` from there up to `n - 2`, a strategy sees
//! `series[0..t]` and predicts `series[t + 1]`, so each report scores
//! exactly `n - start - 1` predictions.

use crate::config::BacktestConfig;
use crate::error::{ForecastError, Result};
use crate::models::random_forest::{lag_features, LagRegressor};
use crate::models::{ForecastModel, Lag1Model, LinearTrendModel, StrategyKind};
use crate::series::ReturnSeries;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use trade_math::stats;

/// Floor of the MASE denominator
const MASE_EPSILON: f64 = 1e-8;

/// Confusion counts and scores for the sign of the predicted return
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DirectionalMetrics {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tn: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl DirectionalMetrics {
    /// A strictly positive return counts as the positive class
    pub fn from_pairs(actual: &[f64], predicted: &[f64]) -> Self {
        let mut metrics = DirectionalMetrics::default();
        for (a, p) in actual.iter().zip(predicted) {
            match (*a > 0.0, *p > 0.0) {
                (true, true) => metrics.tp += 1,
                (false, true) => metrics.fp += 1,
                (true, false) => metrics.fn_ += 1,
                (false, false) => metrics.tn += 1,
            }
        }

        let tp = metrics.tp as f64;
        metrics.precision = if metrics.tp + metrics.fp > 0 {
            tp / (metrics.tp + metrics.fp) as f64
        } else {
            0.0
        };
        metrics.recall = if metrics.tp + metrics.fn_ > 0 {
            tp / (metrics.tp + metrics.fn_) as f64
        } else {
            0.0
        };
        metrics.f1 = if metrics.precision + metrics.recall > 0.0 {
            2.0 * metrics.precision * metrics.recall / (metrics.precision + metrics.recall)
        } else {
            0.0
        };
        metrics
    }
}

/// Accuracy of one strategy over the walk-forward window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy: StrategyKind,
    /// Number of one-step predictions scored
    pub count: usize,
    pub mae: f64,
    pub rmse: f64,
    /// MAE scaled by the in-sample naive (lag-1) error of the training window
    pub mase: f64,
    pub classification: DirectionalMetrics,
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backtest of {} ({} predictions):", self.strategy, self.count)?;
        writeln!(f, "  MAE:       {:.6}", self.mae)?;
        writeln!(f, "  RMSE:      {:.6}", self.rmse)?;
        writeln!(f, "  MASE:      {:.4}", self.mase)?;
        writeln!(f, "  Precision: {:.2}", self.classification.precision)?;
        writeln!(f, "  Recall:    {:.2}", self.classification.recall)?;
        writeln!(f, "  F1:        {:.2}", self.classification.f1)?;
        Ok(())
    }
}

/// Drives one-step predictors over the walk-forward window
#[derive(Debug, Clone, Default)]
pub struct WalkForwardBacktester {
    config: BacktestConfig,
}

impl WalkForwardBacktester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Index of the first prediction origin for a series of length `len`
    pub fn start_index(&self, len: usize) -> Result<usize> {
        if len < self.config.min_points {
            return Err(ForecastError::InsufficientData(format!(
                "Backtest needs {} observations, got {}",
                self.config.min_points, len
            )));
        }
        let start = (self.config.train_fraction * len as f64).floor() as usize;
        if start == 0 || start + 1 >= len {
            return Err(ForecastError::InsufficientData(format!(
                "Training fraction {} leaves no test points in {} observations",
                self.config.train_fraction, len
            )));
        }
        Ok(start)
    }

    /// Score an arbitrary one-step predictor. `predict` receives the
    /// history `series[0..t]` and returns its guess for `series[t + 1]`.
    pub fn evaluate<F>(&self, strategy: StrategyKind, values: &[f64], mut predict: F) -> Result<BacktestReport>
    where
        F: FnMut(&[f64]) -> Result<f64>,
    {
        let start = self.start_index(values.len())?;

        let mut predicted = Vec::with_capacity(values.len() - start - 1);
        let mut actual = Vec::with_capacity(values.len() - start - 1);
        for t in start..values.len() - 1 {
            predicted.push(predict(&values[..t])?);
            actual.push(values[t + 1]);
        }

        let mae = stats::mean_absolute_error(&predicted, &actual)?;
        let rmse = stats::root_mean_squared_error(&predicted, &actual)?;
        let naive = stats::mean_abs_diff(&values[..start]).unwrap_or(0.0);
        let mase = mae / naive.max(MASE_EPSILON);

        debug!(strategy = %strategy, count = predicted.len(), mae, rmse, "backtest scored");
        Ok(BacktestReport {
            strategy,
            count: predicted.len(),
            mae,
            rmse,
            mase,
            classification: DirectionalMetrics::from_pairs(&actual, &predicted),
        })
    }

    /// Backtest the linear trend and lag-1 baselines, and the supplied
    /// lag regressor when there is one
    pub fn run(&self, series: &ReturnSeries, regressor: Option<&dyn LagRegressor>) -> Result<Vec<BacktestReport>> {
        let values = series.values();
        let mut reports = Vec::with_capacity(3);

        reports.push(self.evaluate(StrategyKind::LinearTrend, values, trend_or_last)?);
        reports.push(self.evaluate(StrategyKind::Lag1, values, |history| {
            Lag1Model::predict_next(history).ok_or_else(|| {
                ForecastError::InsufficientData("Lag-1 needs at least one observation".to_string())
            })
        })?);

        if let Some(regressor) = regressor {
            let lags = regressor.lags();
            reports.push(self.evaluate(StrategyKind::RandomForest, values, |history| {
                match regressor.predict(&lag_features(history, lags)) {
                    Ok(prediction) if prediction.is_finite() => Ok(prediction),
                    Ok(_) => trend_or_last(history),
                    Err(e) => {
                        warn!(error = %e, "regressor prediction failed, using linear trend");
                        trend_or_last(history)
                    }
                }
            })?);
        }

        Ok(reports)
    }

    /// Backtest any strategy through its multi-step interface, one step at a time
    pub fn run_model(&self, model: &dyn ForecastModel, series: &ReturnSeries) -> Result<BacktestReport> {
        self.evaluate(model.kind(), series.values(), |history| {
            let window = series.head(history.len());
            let result = model.forecast(&window, 1)?;
            result.values().first().copied().ok_or_else(|| {
                ForecastError::ModelUnavailable(format!("{} produced no prediction", model.kind()))
            })
        })
    }
}

/// Linear trend prediction, or the last value when the fit fails
fn trend_or_last(history: &[f64]) -> Result<f64> {
    match LinearTrendModel::predict_next(history) {
        Ok(prediction) if prediction.is_finite() => Ok(prediction),
        _ => history.last().copied().ok_or_else(|| {
            ForecastError::InsufficientData("Empty backtest history".to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{TimeZone, Utc};

    fn series(values: Vec<f64>) -> ReturnSeries {
        ReturnSeries::daily(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), values).unwrap()
    }

    #[derive(Debug)]
    struct Failing;

    impl LagRegressor for Failing {
        fn lags(&self) -> usize {
            5
        }

        fn predict(&self, _features: &[f64]) -> Result<f64> {
            Err(ForecastError::ModelUnavailable("not loaded".to_string()))
        }
    }

    #[test]
    fn test_directional_metrics() {
        let actual = [0.1, -0.1, 0.2, -0.3, 0.0];
        let predicted = [0.2, 0.1, -0.1, -0.2, -0.1];
        let metrics = DirectionalMetrics::from_pairs(&actual, &predicted);

        assert_eq!((metrics.tp, metrics.fp, metrics.fn_, metrics.tn), (1, 1, 1, 2));
        assert_abs_diff_eq!(metrics.precision, 0.5);
        assert_abs_diff_eq!(metrics.recall, 0.5);
        assert_abs_diff_eq!(metrics.f1, 0.5);
    }

    #[test]
    fn test_directional_metrics_without_positives() {
        let metrics = DirectionalMetrics::from_pairs(&[-0.1, -0.2], &[-0.1, 0.0]);
        assert_eq!(metrics.tn, 2);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.f1, 0.0);
    }

    #[test]
    fn test_count_and_perfect_trend() {
        let values: Vec<f64> = (0..50).map(|i| 0.001 * i as f64).collect();
        let reports = WalkForwardBacktester::default().run(&series(values), None).unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].strategy, StrategyKind::LinearTrend);
        assert_eq!(reports[0].count, 50 - 40 - 1);
        // the history ends at t - 1 and the target is t + 1, two steps ahead
        assert_abs_diff_eq!(reports[0].mae, 0.001, epsilon = 1e-9);
        assert_abs_diff_eq!(reports[1].mae, 0.002, epsilon = 1e-9);
        assert_abs_diff_eq!(reports[1].mase, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_failing_regressor_uses_trend() {
        let values: Vec<f64> = (0..40).map(|i| ((i * 7) % 11) as f64 * 0.001 - 0.005).collect();
        let data = series(values);
        let reports = WalkForwardBacktester::default().run(&data, Some(&Failing)).unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[2].strategy, StrategyKind::RandomForest);
        assert_abs_diff_eq!(reports[2].mae, reports[0].mae, epsilon = 1e-12);
    }

    #[test]
    fn test_short_series_is_rejected() {
        let err = WalkForwardBacktester::default()
            .run(&series(vec![0.01; 29]), None)
            .unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData(_)));
    }

    #[test]
    fn test_run_model_matches_lag1_closure() {
        let values: Vec<f64> = (0..30).map(|i| (i as f64 * 0.7).sin() * 0.01).collect();
        let data = series(values);
        let backtester = WalkForwardBacktester::default();

        let via_model = backtester.run_model(&Lag1Model, &data).unwrap();
        let reports = backtester.run(&data, None).unwrap();
        assert_eq!(via_model, reports[1]);
    }
}
