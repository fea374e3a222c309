//! Failure handling around strategy invocations
//!
//! Strategies report failures as `Err`; this layer turns each invocation into
//! a [`StrategyOutcome`] so the combiner decides between inclusion and
//! exclusion by matching on a value instead of catching errors. The last
//! resort chain (linear trend, then zeros) lives here too.

use crate::cache::{CacheKey, ForecastCache};
use crate::config::Capabilities;
use crate::error::ErrorKind;
use crate::models::{ForecastModel, ForecastResult, LinearTrendModel, Strategy, StrategyKind};
use crate::series::ReturnSeries;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A strategy that did not contribute to the ensemble, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub strategy: StrategyKind,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Result of running one strategy under the policy
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// The strategy produced a forecast, possibly through its own simpler fallback
    Produced(ForecastResult),
    Excluded(Exclusion),
}

impl StrategyOutcome {
    pub fn strategy(&self) -> StrategyKind {
        match self {
            StrategyOutcome::Produced(result) => result.strategy(),
            StrategyOutcome::Excluded(exclusion) => exclusion.strategy,
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, StrategyOutcome::Produced(_))
    }
}

/// Which rung of the degradation ladder produced the final forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackLevel {
    /// One or more configured strategies were blended
    Ensemble,
    /// Every configured strategy failed; linear trend alone
    LinearTrend,
    /// Even the linear trend failed; a zero vector
    Zero,
}

/// Runs strategies with availability checks and result caching
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    capabilities: Capabilities,
    cache: Arc<dyn ForecastCache>,
}

impl FallbackPolicy {
    pub fn new(capabilities: Capabilities, cache: Arc<dyn ForecastCache>) -> Self {
        Self {
            capabilities,
            cache,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn cache(&self) -> &Arc<dyn ForecastCache> {
        &self.cache
    }

    /// Run a single strategy. Never returns an error: failures become
    /// [`StrategyOutcome::Excluded`].
    pub fn run(&self, strategy: &Strategy, series: &ReturnSeries, horizon: usize) -> StrategyOutcome {
        let kind = strategy.kind();
        if !strategy.is_available(&self.capabilities) {
            debug!(strategy = %kind, "strategy unavailable in this build");
            return StrategyOutcome::Excluded(Exclusion {
                strategy: kind,
                kind: ErrorKind::ModelUnavailable,
                reason: format!("{} is not available", kind),
            });
        }

        let key = CacheKey::new(kind, series, horizon);
        if let Some(cached) = self.cache.get(&key) {
            debug!(strategy = %kind, horizon, "forecast served from cache");
            return StrategyOutcome::Produced(cached);
        }

        match strategy.forecast(series, horizon) {
            Ok(result) => {
                if let Some(fallback) = result.fallback() {
                    info!(strategy = %kind, fallback = %fallback, "strategy degraded to a simpler model");
                }
                self.cache.insert(key, result.clone());
                StrategyOutcome::Produced(result)
            }
            Err(e) => {
                warn!(strategy = %kind, horizon, error = %e, "strategy excluded");
                StrategyOutcome::Excluded(Exclusion {
                    strategy: kind,
                    kind: e.kind(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Run every strategy in order, splitting successes from exclusions
    pub fn run_all(
        &self,
        strategies: &[Strategy],
        series: &ReturnSeries,
        horizon: usize,
    ) -> (Vec<ForecastResult>, Vec<Exclusion>) {
        let mut produced = Vec::new();
        let mut excluded = Vec::new();
        for strategy in strategies {
            match self.run(strategy, series, horizon) {
                StrategyOutcome::Produced(result) => produced.push(result),
                StrategyOutcome::Excluded(exclusion) => excluded.push(exclusion),
            }
        }
        (produced, excluded)
    }
}

/// The always-succeeding end of the chain: a linear trend over `series`,
/// or zeros when even that cannot be computed
pub fn last_resort(series: &ReturnSeries, horizon: usize) -> (Vec<f64>, FallbackLevel) {
    match LinearTrendModel::extrapolate(series.values(), horizon) {
        Ok(values) if values.iter().all(|v| v.is_finite()) => (values, FallbackLevel::LinearTrend),
        Ok(_) => {
            warn!(horizon, "linear trend was not finite, returning zeros");
            (vec![0.0; horizon], FallbackLevel::Zero)
        }
        Err(e) => {
            warn!(horizon, error = %e, "linear trend failed, returning zeros");
            (vec![0.0; horizon], FallbackLevel::Zero)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FifoCache, NoopCache};
    use crate::config::EngineConfig;
    use crate::models::StrategyKind;
    use chrono::{TimeZone, Utc};

    fn series(values: Vec<f64>) -> ReturnSeries {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        ReturnSeries::daily(start, values).unwrap()
    }

    #[test]
    fn test_unavailable_strategy_is_excluded() {
        let policy = FallbackPolicy::new(Capabilities::none(), Arc::new(NoopCache));
        let strategy = Strategy::from_config(StrategyKind::Arima, &EngineConfig::default());

        match policy.run(&strategy, &series(vec![0.01; 50]), 3) {
            StrategyOutcome::Excluded(exclusion) => {
                assert_eq!(exclusion.strategy, StrategyKind::Arima);
                assert_eq!(exclusion.kind, ErrorKind::ModelUnavailable);
            }
            other => panic!("expected exclusion, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_is_excluded_with_its_kind() {
        let policy = FallbackPolicy::new(Capabilities::probe(), Arc::new(NoopCache));
        let strategy = Strategy::from_config(StrategyKind::RandomForest, &EngineConfig::default());

        let outcome = policy.run(&strategy, &series(vec![0.01, 0.02, 0.0, -0.01, 0.01]), 2);
        assert!(!outcome.is_produced());
        assert_eq!(outcome.strategy(), StrategyKind::RandomForest);
        match outcome {
            StrategyOutcome::Excluded(exclusion) => {
                assert_eq!(exclusion.kind, ErrorKind::InsufficientData)
            }
            StrategyOutcome::Produced(_) => unreachable!(),
        }
    }

    #[test]
    fn test_results_are_cached() {
        let cache = Arc::new(FifoCache::new(4));
        let policy = FallbackPolicy::new(Capabilities::probe(), cache.clone());
        let strategy = Strategy::from_config(StrategyKind::Lag1, &EngineConfig::default());
        let data = series(vec![0.01, -0.02, 0.03, 0.01, 0.02]);

        let first = policy.run(&strategy, &data, 3);
        assert_eq!(cache.len(), 1);
        let second = policy.run(&strategy, &data, 3);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_run_all_splits_outcomes() {
        let policy = FallbackPolicy::new(Capabilities::none(), Arc::new(NoopCache));
        let config = EngineConfig::default();
        let strategies: Vec<Strategy> = [StrategyKind::Lag1, StrategyKind::Seasonal, StrategyKind::LinearTrend]
            .iter()
            .map(|&kind| Strategy::from_config(kind, &config))
            .collect();

        let (produced, excluded) = policy.run_all(&strategies, &series(vec![0.01; 10]), 2);
        assert_eq!(produced.len(), 2);
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].strategy, StrategyKind::Seasonal);
    }

    #[test]
    fn test_last_resort_prefers_linear_trend() {
        let (values, level) = last_resort(&series(vec![0.01, 0.02, 0.03]), 2);
        assert_eq!(level, FallbackLevel::LinearTrend);
        assert!((values[1] - 0.05).abs() < 1e-12);
    }
}
