//! Weighted blending of strategy forecasts
//!
//! With two or more return forecasts the weights come from validation error:
//! each forecast's tail is compared against the last `max(5, n/5)`
//! observations and weighted by `1 / (mse + ε)`. With a single forecast the
//! static table applies (which normalizes to 1). With none, the combiner
//! drops down the [`last_resort`] chain. Combining never fails.

use crate::models::{ForecastResult, StrategyKind};
use crate::policy::{last_resort, Exclusion, FallbackLevel};
use crate::series::ReturnSeries;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use trade_math::stats;

/// Added to each validation error before inversion
pub const WEIGHT_EPSILON: f64 = 1e-8;

/// Smallest validation window
pub const MIN_VALIDATION_POINTS: usize = 5;

/// Prior weight of a strategy when no validation signal is used
pub fn static_weight(kind: StrategyKind) -> f64 {
    match kind {
        StrategyKind::Neural => 0.35,
        StrategyKind::Arima => 0.25,
        StrategyKind::Seasonal => 0.25,
        StrategyKind::RandomForest => 0.15,
        StrategyKind::LinearTrend => 0.10,
        StrategyKind::Lag1 => 0.10,
        StrategyKind::NaiveZero => 0.05,
        StrategyKind::Garch => 0.0,
    }
}

/// Non-negative weights per strategy, summing to one
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnsembleWeightSet {
    weights: BTreeMap<StrategyKind, f64>,
}

impl EnsembleWeightSet {
    /// Normalize raw scores. Repeated strategies have their scores summed.
    /// Returns `None` when they cannot be turned into a distribution (empty,
    /// negative, non-finite or all zero).
    pub fn normalized<I>(raw: I) -> Option<Self>
    where
        I: IntoIterator<Item = (StrategyKind, f64)>,
    {
        let raw: Vec<(StrategyKind, f64)> = raw.into_iter().collect();
        if raw.iter().any(|(_, w)| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let total: f64 = raw.iter().map(|(_, w)| w).sum();
        if !(total > 0.0) || !total.is_finite() {
            return None;
        }
        let mut weights = BTreeMap::new();
        for (kind, weight) in raw {
            *weights.entry(kind).or_insert(0.0) += weight / total;
        }
        Some(Self { weights })
    }

    /// Equal weights over `kinds`
    pub fn equal(kinds: &[StrategyKind]) -> Self {
        let weight = 1.0 / kinds.len().max(1) as f64;
        Self {
            weights: kinds.iter().map(|&k| (k, weight)).collect(),
        }
    }

    pub fn single(kind: StrategyKind) -> Self {
        Self {
            weights: BTreeMap::from([(kind, 1.0)]),
        }
    }

    pub fn get(&self, kind: StrategyKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StrategyKind, f64)> + '_ {
        self.weights.iter().map(|(k, w)| (*k, *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// How the weights of a blended forecast were chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMethod {
    Static,
    Dynamic,
    /// Validation error was unusable, so every forecast counts the same
    Equal,
}

/// The blended forecast with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleForecast {
    pub values: Vec<f64>,
    pub weights: EnsembleWeightSet,
    pub method: WeightingMethod,
    pub level: FallbackLevel,
    /// Strategies that were configured but did not contribute
    pub excluded: Vec<Exclusion>,
}

impl EnsembleForecast {
    pub fn horizon(&self) -> usize {
        self.values.len()
    }

    pub fn mean(&self) -> f64 {
        stats::mean(&self.values).unwrap_or(0.0)
    }
}

/// Combines per-strategy forecasts into one path
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleCombiner;

impl EnsembleCombiner {
    pub fn new() -> Self {
        Self
    }

    /// Static table weights over the produced strategies
    pub fn static_weights(results: &[ForecastResult]) -> EnsembleWeightSet {
        let kinds: Vec<StrategyKind> = results.iter().map(ForecastResult::strategy).collect();
        EnsembleWeightSet::normalized(kinds.iter().map(|&k| (k, static_weight(k))))
            .unwrap_or_else(|| EnsembleWeightSet::equal(&kinds))
    }

    /// Inverse validation-MSE weights. `None` when any error is unusable.
    pub fn dynamic_weights(series: &ReturnSeries, results: &[ForecastResult]) -> Option<EnsembleWeightSet> {
        let validation_len = MIN_VALIDATION_POINTS.max(series.len() / 5);
        let validation = series.tail_values(validation_len);
        if validation.is_empty() {
            return None;
        }

        let mut raw = Vec::with_capacity(results.len());
        for result in results {
            let forecast = result.values();
            let aligned = forecast.len().min(validation.len());
            let predicted = &forecast[forecast.len() - aligned..];
            let actual = &validation[validation.len() - aligned..];
            let mse = stats::mean_squared_error(predicted, actual).ok()?;
            raw.push((result.strategy(), 1.0 / (mse + WEIGHT_EPSILON)));
        }
        EnsembleWeightSet::normalized(raw)
    }

    /// Blend `results` into one forecast of length `horizon`.
    ///
    /// Results of the wrong length or for a non-return strategy are ignored,
    /// as is every result after the first for a given strategy.
    pub fn combine(
        &self,
        series: &ReturnSeries,
        results: Vec<ForecastResult>,
        horizon: usize,
        excluded: Vec<Exclusion>,
    ) -> EnsembleForecast {
        let mut seen = BTreeSet::new();
        let usable: Vec<ForecastResult> = results
            .into_iter()
            .filter(|r| {
                if !(r.strategy().forecasts_returns() && r.horizon() == horizon) {
                    debug!(strategy = %r.strategy(), "forecast not blendable, ignored");
                    return false;
                }
                if !seen.insert(r.strategy()) {
                    debug!(strategy = %r.strategy(), "repeated strategy, ignored");
                    return false;
                }
                true
            })
            .collect();

        if usable.is_empty() {
            let (values, level) = last_resort(series, horizon);
            let fallback_kind = match level {
                FallbackLevel::Zero => StrategyKind::NaiveZero,
                _ => StrategyKind::LinearTrend,
            };
            warn!(level = ?level, excluded = excluded.len(), "no strategy produced a forecast");
            return EnsembleForecast {
                values,
                weights: EnsembleWeightSet::single(fallback_kind),
                method: WeightingMethod::Static,
                level,
                excluded,
            };
        }

        let (weights, method) = if usable.len() < 2 {
            (Self::static_weights(&usable), WeightingMethod::Static)
        } else {
            match Self::dynamic_weights(series, &usable) {
                Some(weights) => (weights, WeightingMethod::Dynamic),
                None => {
                    warn!("validation error unusable, weighting forecasts equally");
                    let kinds: Vec<StrategyKind> = usable.iter().map(ForecastResult::strategy).collect();
                    (EnsembleWeightSet::equal(&kinds), WeightingMethod::Equal)
                }
            }
        };

        let mut values = vec![0.0; horizon];
        for result in &usable {
            let weight = weights.get(result.strategy());
            for (slot, value) in values.iter_mut().zip(result.values()) {
                *slot += weight * value;
            }
        }
        debug!(weights = ?weights, method = ?method, "ensemble blended");

        EnsembleForecast {
            values,
            weights,
            method,
            level: FallbackLevel::Ensemble,
            excluded,
        }
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

    fn result(kind: StrategyKind, values: Vec<f64>) -> ForecastResult {
        let horizon = values.len();
        ForecastResult::new(kind, values, horizon).unwrap()
    }

    #[test]
    fn test_static_weights_normalize() {
        let weights = EnsembleCombiner::static_weights(&[
            result(StrategyKind::Neural, vec![0.0]),
            result(StrategyKind::RandomForest, vec![0.0]),
        ]);
        assert_abs_diff_eq!(weights.get(StrategyKind::Neural), 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(weights.get(StrategyKind::RandomForest), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_lower_error_gets_more_weight() {
        let data = series(vec![0.01; 25]);
        let close = result(StrategyKind::Arima, vec![0.011; 5]);
        let far = result(StrategyKind::Lag1, vec![0.03; 5]);

        let weights = EnsembleCombiner::dynamic_weights(&data, &[close, far]).unwrap();
        assert!(weights.get(StrategyKind::Arima) > weights.get(StrategyKind::Lag1));
        assert!(weights.get(StrategyKind::Lag1) > 0.0);
        assert_abs_diff_eq!(weights.total(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_combine_blends_elementwise() {
        let data = series(vec![0.0; 20]);
        let a = result(StrategyKind::LinearTrend, vec![0.01, 0.01]);
        let b = result(StrategyKind::Lag1, vec![-0.01, -0.01]);

        let forecast = EnsembleCombiner::new().combine(&data, vec![a, b], 2, Vec::new());
        assert_eq!(forecast.method, WeightingMethod::Dynamic);
        assert_eq!(forecast.level, FallbackLevel::Ensemble);
        // equal errors give equal weights
        assert_abs_diff_eq!(forecast.values[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_result_passes_through() {
        let data = series(vec![0.0; 10]);
        let only = result(StrategyKind::RandomForest, vec![0.02, 0.03]);

        let forecast = EnsembleCombiner::new().combine(&data, vec![only], 2, Vec::new());
        assert_eq!(forecast.values, vec![0.02, 0.03]);
        assert_eq!(forecast.weights.get(StrategyKind::RandomForest), 1.0);
        assert_eq!(forecast.method, WeightingMethod::Static);
    }

    #[test]
    fn test_no_results_fall_back_to_trend() {
        let data = series(vec![0.01, 0.02, 0.03, 0.04, 0.05]);
        let forecast = EnsembleCombiner::new().combine(&data, Vec::new(), 3, Vec::new());

        assert_eq!(forecast.level, FallbackLevel::LinearTrend);
        assert_eq!(forecast.weights.get(StrategyKind::LinearTrend), 1.0);
        assert_abs_diff_eq!(forecast.values[2], 0.08, epsilon = 1e-12);
    }

    #[test]
    fn test_volatility_and_wrong_length_are_ignored() {
        let data = series(vec![0.01; 10]);
        let vol = result(StrategyKind::Garch, vec![0.2, 0.2]);
        let short = result(StrategyKind::Lag1, vec![0.01]);
        let good = result(StrategyKind::Arima, vec![0.0, 0.0]);

        let forecast = EnsembleCombiner::new().combine(&data, vec![vol, short, good], 2, Vec::new());
        assert_eq!(forecast.weights.len(), 1);
        assert_eq!(forecast.weights.get(StrategyKind::Arima), 1.0);
    }

    #[test]
    fn test_repeated_strategy_blends_once() {
        let data = series((0..25).map(|i| 0.001 * (i % 4) as f64).collect());
        let first = result(StrategyKind::Lag1, vec![0.002, 0.002]);
        let repeat = result(StrategyKind::Lag1, vec![0.05, 0.05]);
        let trend = result(StrategyKind::LinearTrend, vec![0.001, 0.001]);

        let forecast = EnsembleCombiner::new().combine(&data, vec![first, repeat, trend], 2, Vec::new());
        assert_eq!(forecast.weights.len(), 2);
        assert_abs_diff_eq!(forecast.weights.total(), 1.0, epsilon = 1e-9);

        let expected = forecast.weights.get(StrategyKind::Lag1) * 0.002
            + forecast.weights.get(StrategyKind::LinearTrend) * 0.001;
        assert_abs_diff_eq!(forecast.values[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_repeated_raw_weights_are_summed() {
        let weights = EnsembleWeightSet::normalized(vec![
            (StrategyKind::Lag1, 1.0),
            (StrategyKind::Lag1, 1.0),
            (StrategyKind::Arima, 2.0),
        ])
        .unwrap();
        assert_abs_diff_eq!(weights.get(StrategyKind::Lag1), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(weights.total(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_degenerate_raw_weights() {
        assert!(EnsembleWeightSet::normalized(Vec::new()).is_none());
        assert!(EnsembleWeightSet::normalized(vec![(StrategyKind::Lag1, f64::NAN)]).is_none());
        assert!(EnsembleWeightSet::normalized(vec![(StrategyKind::Lag1, 0.0)]).is_none());
    }
}
