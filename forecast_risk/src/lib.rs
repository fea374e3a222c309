//! # Forecast Risk
//!
//! Return forecasting ensembles and tail-risk metrics for securities and
//! portfolios.
//!
//! ## Features
//!
//! - Sanitizing raw return observations (missing values, outliers, ordering)
//! - Forecasting strategies: naive zero, lag-1, linear trend, random forest,
//!   order-searched ARIMA, GARCH-family volatility, an LSTM (behind the
//!   `neural` feature) and a trend plus seasonality model
//! - Walk-forward backtesting with MAE, RMSE, MASE and directional scores
//! - Validation-error weighted ensembles that never fail to produce a forecast
//! - VaR, CVaR, Sharpe ratio and max drawdown, historical and forward looking
//! - A bounded FIFO forecast cache
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use forecast_risk::{EngineConfig, ReturnSeries, RiskEngine, StrategyKind};
//!
//! let config = EngineConfig {
//!     enabled_strategies: vec![StrategyKind::LinearTrend, StrategyKind::Lag1],
//!     ..EngineConfig::default()
//! };
//! let engine = RiskEngine::new(config)?;
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let returns: Vec<f64> = (0..40).map(|i| 0.001 * ((i % 5) as f64 - 2.0)).collect();
//! let series = ReturnSeries::daily(start, returns)?;
//!
//! let forecast = engine.forecast(&series, 10);
//! assert_eq!(forecast.values.len(), 10);
//!
//! let var = forecast_risk::risk::value_at_risk(series.values(), 10_000.0, 0.95);
//! assert!(var >= 0.0);
//! # Ok::<(), forecast_risk::ForecastError>(())
//! ```

pub mod backtest;
pub mod cache;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod logging;
pub mod models;
pub mod policy;
pub mod portfolio;
pub mod risk;
pub mod sanitize;
pub mod series;

// Re-export commonly used types
pub use crate::backtest::{BacktestReport, DirectionalMetrics, WalkForwardBacktester};
pub use crate::cache::{CacheKey, FifoCache, ForecastCache, NoopCache};
pub use crate::config::{Capabilities, EngineConfig};
pub use crate::ensemble::{EnsembleCombiner, EnsembleForecast, EnsembleWeightSet, WeightingMethod};
pub use crate::error::{ErrorKind, ForecastError, Result};
pub use crate::models::{ForecastModel, ForecastResult, Strategy, StrategyKind};
pub use crate::policy::{Exclusion, FallbackLevel, FallbackPolicy, StrategyOutcome};
pub use crate::portfolio::{
    PortfolioOutcome, PortfolioReport, PositionInput, RiskEngine, SecurityReport,
};
pub use crate::risk::{RiskLevel, RiskSnapshot};
pub use crate::sanitize::{RawObservation, RawValue, Sanitizer};
pub use crate::series::ReturnSeries;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
