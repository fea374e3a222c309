//! Security and portfolio risk analysis
//!
//! [`RiskEngine`] wires the pipeline together: sanitize each position's
//! returns, run the enabled strategies under the fallback policy, blend
//! them, backtest the baselines, forecast volatility and turn everything
//! into risk figures. Positions are independent, so they may be processed
//! in parallel; the report keeps the input order.

use crate::backtest::{BacktestReport, WalkForwardBacktester};
use crate::cache::{FifoCache, ForecastCache};
use crate::config::{Capabilities, EngineConfig};
use crate::ensemble::{EnsembleCombiner, EnsembleForecast};
use crate::error::{ForecastError, Result};
use crate::models::garch::VolatilityForecast;
use crate::models::{GarchModel, LagRegressor, Strategy, StrategyKind};
use crate::policy::FallbackPolicy;
use crate::risk::{self, AssessmentInput, RiskLevel, RiskSnapshot};
use crate::sanitize::{RawObservation, Sanitizer};
use crate::series::ReturnSeries;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trade_math::stats;

/// Error payload returned when no position could be analyzed
pub const NO_VALID_DATA: &str = "No valid stock data found for portfolio.";

/// One holding: its size, cost basis, latest price and return history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInput {
    pub name: String,
    pub quantity: f64,
    pub buy_price: f64,
    pub current_price: f64,
    pub returns: Vec<RawObservation>,
}

impl PositionInput {
    /// Build a position from a close-price history. The current price is
    /// the last close and the returns are its percent changes.
    pub fn from_prices(
        name: impl Into<String>,
        quantity: f64,
        buy_price: f64,
        timestamps: Vec<DateTime<Utc>>,
        prices: &[f64],
    ) -> Result<Self> {
        let current_price = prices.last().copied().ok_or_else(|| {
            ForecastError::InsufficientData("Price history is empty".to_string())
        })?;
        let series = ReturnSeries::from_prices(timestamps, prices)?;
        let returns = series
            .timestamps()
            .iter()
            .zip(series.values())
            .map(|(ts, v)| RawObservation::new(*ts, *v))
            .collect();

        Ok(Self {
            name: name.into(),
            quantity,
            buy_price,
            current_price,
            returns,
        })
    }
}

/// Backtest result for a security, or why it was not run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BacktestStatus {
    Completed { reports: Vec<BacktestReport> },
    Skipped { reason: String },
}

impl BacktestStatus {
    pub fn reports(&self) -> &[BacktestReport] {
        match self {
            BacktestStatus::Completed { reports } => reports,
            BacktestStatus::Skipped { .. } => &[],
        }
    }
}

/// Analysis of a single position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub name: String,
    pub quantity: f64,
    pub buy_price: f64,
    pub current_price: f64,
    pub position_value: f64,
    /// Share of the portfolio's total position value
    pub weight: f64,
    pub profit_loss: f64,
    pub roi_pct: f64,
    /// Risk of the historical returns applied to the position value
    pub historical: RiskSnapshot,
    pub ensemble: EnsembleForecast,
    pub mean_forecast: f64,
    pub forecast_var: f64,
    pub forecast_cvar: f64,
    pub volatility: VolatilityForecast,
    pub parametric_var: f64,
    pub backtest: BacktestStatus,
    #[serde(skip)]
    series: Option<ReturnSeries>,
}

impl SecurityReport {
    pub fn forecast(&self) -> &[f64] {
        &self.ensemble.values
    }

    /// The sanitized return series the report was computed from
    pub fn series(&self) -> Option<&ReturnSeries> {
        self.series.as_ref()
    }
}

/// A position that could not be analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSecurity {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_profit_loss: f64,
    pub return_pct: f64,
    /// Risk of the value-weighted historical returns
    pub historical: RiskSnapshot,
    /// Value-weighted forecast path
    pub forecast: Vec<f64>,
    pub forecast_var: f64,
    pub forecast_cvar: f64,
    pub volatility: Vec<f64>,
    pub parametric_var: f64,
    pub risk_level: RiskLevel,
    pub recommendation: String,
    pub forecast_days: usize,
    pub confidence_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub summary: PortfolioSummary,
    pub securities: Vec<SecurityReport>,
    pub skipped: Vec<SkippedSecurity>,
}

/// Outcome of a portfolio request. Failure is a value, not an `Err`, so a
/// caller can hand it to a client unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortfolioOutcome {
    Completed(PortfolioReport),
    Failed { error: String },
}

impl PortfolioOutcome {
    pub fn report(&self) -> Option<&PortfolioReport> {
        match self {
            PortfolioOutcome::Completed(report) => Some(report),
            PortfolioOutcome::Failed { .. } => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The forecasting and risk pipeline
#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: EngineConfig,
    strategies: Vec<Strategy>,
    policy: FallbackPolicy,
    combiner: EnsembleCombiner,
    backtester: WalkForwardBacktester,
    sanitizer: Sanitizer,
    volatility: GarchModel,
    regressor: Option<Arc<dyn LagRegressor>>,
}

impl RiskEngine {
    /// Engine with a FIFO cache sized by the configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        let cache = Arc::new(FifoCache::new(config.cache_capacity));
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: EngineConfig, cache: Arc<dyn ForecastCache>) -> Result<Self> {
        config.validate()?;
        let capabilities = config.capabilities();
        let strategies = config
            .enabled_strategies
            .iter()
            .filter(|kind| kind.forecasts_returns())
            .map(|&kind| Strategy::from_config(kind, &config))
            .collect();

        info!(
            strategies = ?config.enabled_strategies,
            horizon = config.forecast_days,
            confidence = config.confidence_level,
            "risk engine ready"
        );
        Ok(Self {
            strategies,
            policy: FallbackPolicy::new(capabilities, cache),
            combiner: EnsembleCombiner::new(),
            backtester: WalkForwardBacktester::new(config.backtest.clone()),
            sanitizer: Sanitizer::default(),
            volatility: GarchModel::default(),
            regressor: None,
            config,
        })
    }

    /// Use a pre-trained lag regressor, adding its backtest to every report
    pub fn with_regressor(mut self, regressor: Arc<dyn LagRegressor>) -> Self {
        self.regressor = Some(regressor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.policy.capabilities()
    }

    /// Which strategies this build can run
    pub fn availability(&self) -> BTreeMap<StrategyKind, bool> {
        self.capabilities().availability()
    }

    /// Drop every cached forecast
    pub fn clear_cache(&self) {
        self.policy.cache().clear();
        info!("forecast cache cleared");
    }

    pub fn cached_forecasts(&self) -> usize {
        self.policy.cache().len()
    }

    /// Blend the enabled strategies over `series`. Never fails.
    pub fn forecast(&self, series: &ReturnSeries, horizon: usize) -> EnsembleForecast {
        let (produced, excluded) = self.policy.run_all(&self.strategies, series, horizon);
        self.combiner.combine(series, produced, horizon, excluded)
    }

    /// Walk-forward reports for the baselines and the optional regressor
    pub fn backtest(&self, series: &ReturnSeries) -> Result<Vec<BacktestReport>> {
        self.backtester.run(series, self.regressor.as_deref())
    }

    /// Volatility path over `horizon`, zeros when it cannot be estimated
    pub fn forecast_volatility(&self, series: &ReturnSeries, horizon: usize) -> VolatilityForecast {
        let outcome = if self.capabilities().vol_model_available {
            self.volatility.forecast_volatility(series.values(), horizon)
        } else {
            GarchModel::sample_std_path(series.values(), horizon).map(|path| VolatilityForecast {
                path,
                variant: None,
            })
        };
        outcome.unwrap_or_else(|e| {
            warn!(error = %e, "volatility unavailable, using zeros");
            VolatilityForecast {
                path: vec![0.0; horizon],
                variant: None,
            }
        })
    }

    /// Analyze one position. The weight is left at zero; the portfolio
    /// pass fills it in.
    pub fn analyze_security(&self, position: &PositionInput) -> Result<SecurityReport> {
        let horizon = self.config.forecast_days;
        let confidence = self.config.confidence_level;

        if !(position.quantity.is_finite() && position.quantity >= 0.0) {
            return Err(ForecastError::DataQuality(format!(
                "Invalid quantity {} for {}",
                position.quantity, position.name
            )));
        }
        if !(position.current_price.is_finite() && position.current_price > 0.0) {
            return Err(ForecastError::DataQuality(format!(
                "Invalid current price {} for {}",
                position.current_price, position.name
            )));
        }
        if !position.buy_price.is_finite() {
            return Err(ForecastError::DataQuality(format!(
                "Invalid buy price {} for {}",
                position.buy_price, position.name
            )));
        }

        let series = self.sanitizer.sanitize(&position.returns)?;
        let position_value = position.current_price * position.quantity;
        let profit_loss = (position.current_price - position.buy_price) * position.quantity;
        let roi_pct = if position.buy_price > 0.0 {
            (position.current_price - position.buy_price) / position.buy_price * 100.0
        } else {
            0.0
        };

        let historical = RiskSnapshot::compute(
            series.values(),
            position_value,
            confidence,
            self.config.risk_free_rate,
        );

        let ensemble = self.forecast(&series, horizon);
        let forecast_var = risk::value_at_risk(&ensemble.values, position_value, confidence);
        let forecast_cvar =
            risk::conditional_value_at_risk(&ensemble.values, position_value, confidence);

        let volatility = self.forecast_volatility(&series, horizon);
        let parametric_var = risk::parametric_var(&ensemble.values, &volatility.path, confidence)?;

        let backtest = match self.backtest(&series) {
            Ok(reports) => BacktestStatus::Completed { reports },
            Err(e) => {
                debug!(name = %position.name, error = %e, "backtest skipped");
                BacktestStatus::Skipped {
                    reason: e.to_string(),
                }
            }
        };

        info!(
            name = %position.name,
            observations = series.len(),
            level = ?ensemble.level,
            "security analyzed"
        );
        Ok(SecurityReport {
            name: position.name.clone(),
            quantity: position.quantity,
            buy_price: position.buy_price,
            current_price: position.current_price,
            position_value,
            weight: 0.0,
            profit_loss,
            roi_pct,
            historical,
            mean_forecast: ensemble.mean(),
            ensemble,
            forecast_var,
            forecast_cvar,
            volatility,
            parametric_var,
            backtest,
            series: Some(series),
        })
    }

    /// Analyze every position and aggregate them by position value
    pub fn analyze_portfolio(&self, positions: &[PositionInput]) -> PortfolioOutcome {
        let outcomes: Vec<Result<SecurityReport>> = if self.config.parallel_securities {
            positions.par_iter().map(|p| self.analyze_security(p)).collect()
        } else {
            positions.iter().map(|p| self.analyze_security(p)).collect()
        };

        let mut securities = Vec::new();
        let mut skipped = Vec::new();
        for (position, outcome) in positions.iter().zip(outcomes) {
            match outcome {
                Ok(report) => securities.push(report),
                Err(e) => {
                    warn!(name = %position.name, error = %e, "security skipped");
                    skipped.push(SkippedSecurity {
                        name: position.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if securities.is_empty() {
            warn!(requested = positions.len(), "no security could be analyzed");
            return PortfolioOutcome::Failed {
                error: NO_VALID_DATA.to_string(),
            };
        }

        let summary = self.summarize(&mut securities);
        info!(
            securities = securities.len(),
            skipped = skipped.len(),
            total_value = summary.total_value,
            risk_level = %summary.risk_level,
            "portfolio analyzed"
        );
        PortfolioOutcome::Completed(PortfolioReport {
            summary,
            securities,
            skipped,
        })
    }

    fn summarize(&self, securities: &mut [SecurityReport]) -> PortfolioSummary {
        let horizon = self.config.forecast_days;
        let confidence = self.config.confidence_level;

        let total_value: f64 = securities.iter().map(|s| s.position_value).sum();
        let total_profit_loss: f64 = securities.iter().map(|s| s.profit_loss).sum();
        for security in securities.iter_mut() {
            security.weight = if total_value > 0.0 {
                security.position_value / total_value
            } else {
                0.0
            };
        }

        // historical returns are aligned on the first security's dates
        let index: Vec<DateTime<Utc>> = securities
            .first()
            .and_then(|s| s.series())
            .map(|s| s.timestamps().to_vec())
            .unwrap_or_default();
        let mut returns = vec![0.0; index.len()];
        for security in securities.iter() {
            if let Some(series) = security.series() {
                for (slot, r) in returns.iter_mut().zip(series.aligned_to(&index)) {
                    *slot += security.weight * r;
                }
            }
        }

        let mut forecast = vec![0.0; horizon];
        let mut variance = vec![0.0; horizon];
        for security in securities.iter() {
            for (slot, value) in forecast.iter_mut().zip(security.forecast()) {
                *slot += security.weight * value;
            }
            for (slot, vol) in variance.iter_mut().zip(&security.volatility.path) {
                *slot += (security.weight * vol).powi(2);
            }
        }
        let volatility: Vec<f64> = variance.into_iter().map(f64::sqrt).collect();

        let historical =
            RiskSnapshot::compute(&returns, total_value, confidence, self.config.risk_free_rate);
        let forecast_var = risk::value_at_risk(&forecast, total_value, confidence);
        let forecast_cvar = risk::conditional_value_at_risk(&forecast, total_value, confidence);
        let parametric_var = risk::parametric_var(&forecast, &volatility, confidence).unwrap_or_else(|e| {
            warn!(error = %e, "portfolio parametric VaR unavailable");
            stats::mean(&forecast).unwrap_or(0.0)
        });

        let return_pct = if total_value > 0.0 {
            total_profit_loss / total_value * 100.0
        } else {
            0.0
        };
        let assessment = risk::assess(&AssessmentInput {
            var: historical.var,
            cvar: historical.cvar,
            return_pct,
            max_drawdown: historical.max_drawdown,
            value: total_value,
            forecast_days: horizon,
            holdings: securities
                .iter()
                .map(|s| (s.name.as_str(), s.forecast_var, s.position_value))
                .collect(),
        });

        PortfolioSummary {
            total_value,
            total_profit_loss,
            return_pct,
            historical,
            forecast,
            forecast_var,
            forecast_cvar,
            volatility,
            parametric_var,
            risk_level: assessment.level,
            recommendation: assessment.summary(),
            forecast_days: horizon,
            confidence_level: confidence,
        }
    }
}
