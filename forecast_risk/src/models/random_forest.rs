//! Tree-ensemble regression on lagged returns
//!
//! The forest is trained to map the last `window` returns (newest first) to
//! the next return, then rolled forward autoregressively: each prediction is
//! pushed onto the front of the window to produce the next one.

use crate::config::RandomForestConfig;
use crate::error::{ForecastError, Result};
use crate::models::{check_horizon, ForecastModel, ForecastResult, StrategyKind};
use crate::series::ReturnSeries;
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// A regressor over a fixed number of lagged returns.
///
/// This is the seam an externally persisted model plugs into. Features are
/// always passed newest first.
pub trait LagRegressor: fmt::Debug + Send + Sync {
    /// Number of lagged returns the regressor expects
    fn lags(&self) -> usize;

    /// Predict the next return from `lags()` features, newest first
    fn predict(&self, features: &[f64]) -> Result<f64>;
}

/// The most recent `lags` values of `history`, newest first, zero-padded
/// when the history is shorter
pub fn lag_features(history: &[f64], lags: usize) -> Vec<f64> {
    let mut features: Vec<f64> = history.iter().rev().take(lags).copied().collect();
    features.resize(lags, 0.0);
    features
}

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// A fitted forest together with the lag count it was trained on
#[derive(Debug)]
pub struct TrainedForest {
    forest: Forest,
    lags: usize,
}

impl TrainedForest {
    /// Fit a forest on every complete lag window of `values`
    pub fn fit(values: &[f64], lags: usize, config: &RandomForestConfig) -> Result<Self> {
        if lags == 0 || values.len() <= lags {
            return Err(ForecastError::InsufficientData(format!(
                "Random forest needs more than {} observations, got {}",
                lags,
                values.len()
            )));
        }

        let rows: Vec<Vec<f64>> = (lags..values.len())
            .map(|i| lag_features(&values[..i], lags))
            .collect();
        let targets: Vec<f64> = values[lags..].to_vec();

        let x = DenseMatrix::from_2d_array(&rows.iter().map(Vec::as_slice).collect::<Vec<_>>())
            .map_err(|e| ForecastError::ModelUnavailable(format!("feature matrix: {}", e)))?;

        let params = RandomForestRegressorParameters::default()
            .with_n_trees(config.n_trees)
            .with_max_depth(config.max_depth)
            .with_min_samples_split(2)
            .with_min_samples_leaf(1);

        let forest = RandomForestRegressor::fit(&x, &targets, params)
            .map_err(|e| ForecastError::ModelUnavailable(format!("random forest fit: {}", e)))?;

        debug!(samples = rows.len(), lags, "random forest trained");
        Ok(Self { forest, lags })
    }
}

impl LagRegressor for TrainedForest {
    fn lags(&self) -> usize {
        self.lags
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.lags {
            return Err(ForecastError::InvalidParameter(format!(
                "Expected {} lag features, got {}",
                self.lags,
                features.len()
            )));
        }
        let x = DenseMatrix::from_2d_array(&[features])
            .map_err(|e| ForecastError::ModelUnavailable(format!("feature row: {}", e)))?;
        let prediction = self
            .forest
            .predict(&x)
            .map_err(|e| ForecastError::ModelUnavailable(format!("random forest predict: {}", e)))?;
        prediction.first().copied().ok_or_else(|| {
            ForecastError::ModelUnavailable("random forest returned no prediction".to_string())
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RandomForestModel {
    config: RandomForestConfig,
}

impl RandomForestModel {
    pub fn new(config: RandomForestConfig) -> Self {
        Self { config }
    }

    /// Lag window for a series of length `len`: at most `max_window` and a
    /// third of the series, at least `min_window`
    pub fn window_for(&self, len: usize) -> Result<usize> {
        let window = self.config.max_window.min(len / 3);
        if window < self.config.min_window {
            return Err(ForecastError::InsufficientData(format!(
                "Random forest needs a lag window of {} but {} observations only allow {}",
                self.config.min_window, len, window
            )));
        }
        Ok(window)
    }
}

impl ForecastModel for RandomForestModel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RandomForest
    }

    fn forecast(&self, series: &ReturnSeries, horizon: usize) -> Result<ForecastResult> {
        check_horizon(horizon)?;
        let values = series.values();
        let window = self.window_for(values.len())?;
        let forest = TrainedForest::fit(values, window, &self.config)?;

        let mut recent: VecDeque<f64> = lag_features(values, window).into();
        let mut predictions = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let features: Vec<f64> = recent.iter().copied().collect();
            let next = forest.predict(&features)?;
            predictions.push(next);
            recent.pop_back();
            recent.push_front(next);
        }

        ForecastResult::new(StrategyKind::RandomForest, predictions, horizon)
    }
}
