//! Additive trend plus seasonality
//!
//! Fits `y(t) = a + b·t + Σ Fourier terms` by ridge-regularized least squares,
//! with `t` measured in days so business-day gaps are respected. Which
//! seasonal terms enter depends on the inferred sampling frequency and the
//! amount of history. Forecasts get small Gaussian noise scaled to the
//! historical deviation so the path is not overconfident.

use crate::config::SeasonalConfig;
use crate::error::{ForecastError, Result};
use crate::models::{check_horizon, ForecastModel, ForecastResult, LinearTrendModel, StrategyKind};
use crate::series::ReturnSeries;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use tracing::{debug, warn};
use trade_math::{least_squares, stats};

/// Penalty on seasonal coefficients; keeps short or gappy histories well posed
const RIDGE_PENALTY: f64 = 1e-2;

/// A Fourier seasonal component
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seasonality {
    pub name: &'static str,
    /// Period in days
    pub period: f64,
    pub order: usize,
}

const WEEKLY: Seasonality = Seasonality {
    name: "weekly",
    period: 7.0,
    order: 3,
};
const MONTHLY: Seasonality = Seasonality {
    name: "monthly",
    period: 30.5,
    order: 5,
};
const YEARLY: Seasonality = Seasonality {
    name: "yearly",
    period: 365.25,
    order: 10,
};

#[derive(Debug, Clone, Default)]
pub struct SeasonalModel {
    config: SeasonalConfig,
    seed: Option<u64>,
}

impl SeasonalModel {
    pub fn new(config: SeasonalConfig) -> Self {
        Self { config, seed: None }
    }

    /// Fix the noise generator, for reproducible forecasts
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Seasonal components that the series supports
    pub fn seasonalities(series: &ReturnSeries) -> Vec<Seasonality> {
        let daily_like = series.frequency().is_daily_like();
        let weekly = daily_like && series.len() >= 7;
        let mut components = Vec::new();
        if weekly {
            components.push(WEEKLY);
            if series.len() > 14 {
                components.push(MONTHLY);
            }
        }
        if daily_like && series.len() >= 365 {
            components.push(YEARLY);
        }
        components
    }

    fn fit_and_predict(&self, series: &ReturnSeries, horizon: usize) -> Result<Vec<f64>> {
        let Some(origin) = series.timestamps().first().copied() else {
            return Err(ForecastError::InsufficientData("empty series".to_string()));
        };
        let components = Self::seasonalities(series);
        let history_days: Vec<f64> = series.timestamps().iter().map(|ts| days_since(origin, *ts)).collect();
        let span = history_days.last().copied().unwrap_or(0.0).max(1.0);

        let mut rows: Vec<Vec<f64>> = history_days
            .iter()
            .map(|&day| design_row(day, span, &components))
            .collect();
        let mut target = series.values().to_vec();

        let width = rows.first().map_or(0, Vec::len);
        let penalty = RIDGE_PENALTY.sqrt();
        for column in 2..width {
            let mut row = vec![0.0; width];
            row[column] = penalty;
            rows.push(row);
            target.push(0.0);
        }

        let coefficients = least_squares(&rows, &target)?;
        debug!(
            components = ?components.iter().map(|c| c.name).collect::<Vec<_>>(),
            "seasonal model fitted"
        );

        let future = series.future_timestamps(horizon);
        let mut predictions: Vec<f64> = future
            .iter()
            .map(|ts| {
                design_row(days_since(origin, *ts), span, &components)
                    .iter()
                    .zip(&coefficients)
                    .map(|(x, c)| x * c)
                    .sum()
            })
            .collect();

        let std = stats::std_dev(series.values()).unwrap_or(0.0);
        let noise_std = self.config.noise_scale * std;
        if noise_std > 0.0 {
            let noise = Normal::new(0.0, noise_std)
                .map_err(|e| ForecastError::InvalidParameter(e.to_string()))?;
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            for value in predictions.iter_mut() {
                *value += noise.sample(&mut rng);
            }
        }

        Ok(predictions)
    }
}

fn days_since(origin: DateTime<Utc>, ts: DateTime<Utc>) -> f64 {
    (ts - origin).num_seconds() as f64 / 86_400.0
}

fn design_row(day: f64, span: f64, components: &[Seasonality]) -> Vec<f64> {
    let mut row = vec![1.0, day / span];
    for component in components {
        for k in 1..=component.order {
            let angle = 2.0 * PI * k as f64 * day / component.period;
            row.push(angle.sin());
            row.push(angle.cos());
        }
    }
    row
}

impl ForecastModel for SeasonalModel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Seasonal
    }

    fn forecast(&self, series: &ReturnSeries, horizon: usize) -> Result<ForecastResult> {
        check_horizon(horizon)?;

        let outcome = if series.len() < self.config.min_points {
            Err(ForecastError::InsufficientData(format!(
                "seasonal model needs {} observations, got {}",
                self.config.min_points,
                series.len()
            )))
        } else {
            self.fit_and_predict(series, horizon)
        };

        match outcome {
            Ok(values) => ForecastResult::new(StrategyKind::Seasonal, values, horizon),
            Err(e) => {
                warn!(error = %e, "seasonal model falling back to linear trend");
                let values = LinearTrendModel::extrapolate(series.values(), horizon)?;
                Ok(ForecastResult::new(StrategyKind::Seasonal, values, horizon)?
                    .with_fallback(StrategyKind::LinearTrend))
            }
        }
    }
}
