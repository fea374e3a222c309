//! Engine configuration
//!
//! Settings are loaded from TOML, with every field defaulted so a partial
//! file (or none at all) is valid. The enabled strategy list can also come
//! from the `ENABLED_MODELS` environment variable.

use crate::error::{ForecastError, Result};
use crate::models::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Environment variable holding a comma-separated strategy allow-list
pub const ENABLED_MODELS_ENV: &str = "ENABLED_MODELS";

/// Which optional strategy dependencies are usable in this process.
///
/// Built once by [`Capabilities::probe`] and handed to the engine; nothing
/// reads availability from global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub neural_available: bool,
    pub seasonal_available: bool,
    pub vol_model_available: bool,
    pub tree_available: bool,
    pub ar_available: bool,
}

impl Capabilities {
    /// Detect what this build supports. The neural strategy needs the
    /// `neural` cargo feature; everything else is always compiled in.
    pub fn probe() -> Self {
        Self {
            neural_available: cfg!(feature = "neural"),
            seasonal_available: true,
            vol_model_available: true,
            tree_available: true,
            ar_available: true,
        }
    }

    /// Nothing beyond the dependency-free baselines
    pub fn none() -> Self {
        Self {
            neural_available: false,
            seasonal_available: false,
            vol_model_available: false,
            tree_available: false,
            ar_available: false,
        }
    }

    pub fn allows(&self, kind: StrategyKind) -> bool {
        match kind {
            StrategyKind::NaiveZero | StrategyKind::Lag1 | StrategyKind::LinearTrend => true,
            StrategyKind::RandomForest => self.tree_available,
            StrategyKind::Arima => self.ar_available,
            StrategyKind::Garch => self.vol_model_available,
            StrategyKind::Neural => self.neural_available,
            StrategyKind::Seasonal => self.seasonal_available,
        }
    }

    /// Availability of every strategy, keyed by id
    pub fn availability(&self) -> BTreeMap<StrategyKind, bool> {
        StrategyKind::ALL
            .iter()
            .map(|&kind| (kind, self.allows(kind)))
            .collect()
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::probe()
    }
}

/// Walk-forward backtest settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Shortest series the backtester accepts
    pub min_points: usize,
    /// Fraction of the series used as the initial training window
    pub train_fraction: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            min_points: 30,
            train_fraction: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    pub n_trees: usize,
    pub max_depth: u16,
    /// Lag window upper bound; the window is also capped at a third of the series
    pub max_window: usize,
    pub min_window: usize,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            max_window: 20,
            min_window: 5,
        }
    }
}

/// An autoregressive order: AR terms, differencing, MA terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArimaConfig {
    /// Candidate orders, searched in this order
    pub orders: Vec<ArimaOrder>,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self {
            orders: vec![
                ArimaOrder::new(1, 0, 1),
                ArimaOrder::new(2, 0, 1),
                ArimaOrder::new(1, 0, 2),
                ArimaOrder::new(2, 0, 2),
            ],
        }
    }
}

/// Recurrent network training settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralConfig {
    pub max_lookback: usize,
    pub min_lookback: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub early_stopping_patience: usize,
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub learning_rate: f64,
    /// Std of the noise injected per forecast step, in scaled units
    pub noise_std: f64,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            max_lookback: 30,
            min_lookback: 10,
            epochs: 100,
            batch_size: 32,
            early_stopping_patience: 10,
            lr_patience: 5,
            lr_factor: 0.5,
            learning_rate: 1e-3,
            noise_std: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalConfig {
    /// Shorter series fall back to the linear trend
    pub min_points: usize,
    /// Forecast noise as a fraction of the historical standard deviation
    pub noise_scale: f64,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self {
            min_points: 30,
            noise_scale: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub forecast_days: usize,
    pub confidence_level: f64,
    /// Annual risk-free rate used by the Sharpe ratio
    pub risk_free_rate: f64,
    pub enabled_strategies: Vec<StrategyKind>,
    pub cache_capacity: usize,
    pub parallel_securities: bool,
    pub backtest: BacktestConfig,
    pub random_forest: RandomForestConfig,
    pub arima: ArimaConfig,
    pub neural: NeuralConfig,
    pub seasonal: SeasonalConfig,
    /// Overrides [`Capabilities::probe`] when set
    pub capabilities: Option<Capabilities>,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            forecast_days: 30,
            confidence_level: 0.95,
            risk_free_rate: 0.05,
            enabled_strategies: vec![
                StrategyKind::RandomForest,
                StrategyKind::LinearTrend,
                StrategyKind::Lag1,
            ],
            cache_capacity: 100,
            parallel_securities: true,
            backtest: BacktestConfig::default(),
            random_forest: RandomForestConfig::default(),
            arima: ArimaConfig::default(),
            neural: NeuralConfig::default(),
            seasonal: SeasonalConfig::default(),
            capabilities: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ForecastError::Config(e.to_string()))
    }

    /// Apply `ENABLED_MODELS` when it is set
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var(ENABLED_MODELS_ENV) {
            self.set_enabled_from_list(&raw)?;
            info!(strategies = ?self.enabled_strategies, "strategy list taken from environment");
        }
        Ok(self)
    }

    /// Replace the enabled strategies with a comma-separated list.
    ///
    /// Blank entries are skipped; duplicates keep their first position.
    pub fn set_enabled_from_list(&mut self, raw: &str) -> Result<()> {
        let mut kinds = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let kind: StrategyKind = part.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        self.enabled_strategies = kinds;
        Ok(())
    }

    /// Effective capabilities: the configured override or a fresh probe
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities.unwrap_or_else(Capabilities::probe)
    }

    pub fn validate(&self) -> Result<()> {
        if self.forecast_days == 0 {
            return Err(ForecastError::Config(
                "forecast_days must be at least 1".to_string(),
            ));
        }
        if let Some(kind) = self
            .enabled_strategies
            .iter()
            .enumerate()
            .find(|(i, kind)| self.enabled_strategies[..*i].contains(kind))
            .map(|(_, kind)| *kind)
        {
            return Err(ForecastError::Config(format!(
                "enabled_strategies lists {} more than once",
                kind
            )));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ForecastError::Config(format!(
                "confidence_level must lie in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ForecastError::Config(
                "risk_free_rate must be finite".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(ForecastError::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.backtest.train_fraction > 0.0 && self.backtest.train_fraction < 1.0) {
            return Err(ForecastError::Config(format!(
                "backtest.train_fraction must lie in (0, 1), got {}",
                self.backtest.train_fraction
            )));
        }
        if self.backtest.min_points < 2 {
            return Err(ForecastError::Config(
                "backtest.min_points must be at least 2".to_string(),
            ));
        }
        let rf = &self.random_forest;
        if rf.n_trees == 0 || rf.max_depth == 0 || rf.min_window == 0 || rf.min_window > rf.max_window {
            return Err(ForecastError::Config(
                "random_forest needs n_trees, max_depth and 0 < min_window <= max_window".to_string(),
            ));
        }
        if self.arima.orders.is_empty() {
            return Err(ForecastError::Config(
                "arima.orders must list at least one order".to_string(),
            ));
        }
        let nn = &self.neural;
        if nn.min_lookback == 0 || nn.min_lookback > nn.max_lookback || nn.epochs == 0 || nn.batch_size == 0 {
            return Err(ForecastError::Config(
                "neural needs epochs, batch_size and 0 < min_lookback <= max_lookback".to_string(),
            ));
        }
        if !(nn.learning_rate > 0.0) || !(nn.lr_factor > 0.0 && nn.lr_factor < 1.0) {
            return Err(ForecastError::Config(
                "neural.learning_rate must be positive and lr_factor in (0, 1)".to_string(),
            ));
        }
        if self.seasonal.noise_scale < 0.0 {
            return Err(ForecastError::Config(
                "seasonal.noise_scale must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
