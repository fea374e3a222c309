//! ARIMA models with a small order search
//!
//! Each candidate order is estimated by the Hannan-Rissanen two-stage
//! regression: a long autoregression supplies residual estimates, then the
//! (differenced, demeaned) series is regressed on its own lags and the
//! lagged residuals. The fit with the lowest AIC produces the forecast.

use crate::config::ArimaOrder;
use crate::error::{ForecastError, Result};
use crate::models::{check_horizon, ForecastModel, ForecastResult, StrategyKind};
use crate::series::ReturnSeries;
use std::f64::consts::PI;
use tracing::{debug, warn};
use trade_math::{least_squares, stats};

/// Fewest usable observations per estimated coefficient
const OBS_PER_PARAMETER: usize = 5;

/// Order-searched ARIMA strategy
#[derive(Debug, Clone)]
pub struct ArimaModel {
    orders: Vec<ArimaOrder>,
}

impl Default for ArimaModel {
    fn default() -> Self {
        Self::new(crate::config::ArimaConfig::default().orders)
    }
}

/// A fitted ARIMA(p, d, q)
#[derive(Debug, Clone)]
pub struct FittedArima {
    order: ArimaOrder,
    /// AR coefficients, lag 1 first
    ar_coefficients: Vec<f64>,
    /// MA coefficients, lag 1 first
    ma_coefficients: Vec<f64>,
    /// Mean of the differenced series
    mean: f64,
    /// Differenced, demeaned observations
    centered: Vec<f64>,
    /// In-sample one-step residuals
    residuals: Vec<f64>,
    /// Last observation at each differencing level, level 0 first
    anchors: Vec<f64>,
    sigma2: f64,
    aic: f64,
}

impl ArimaModel {
    pub fn new(orders: Vec<ArimaOrder>) -> Self {
        Self { orders }
    }

    /// Fit every candidate order and keep the lowest-AIC fit
    pub fn select(&self, values: &[f64]) -> Result<FittedArima> {
        let mut best: Option<FittedArima> = None;
        for &order in &self.orders {
            match FittedArima::fit(values, order) {
                Ok(fit) => {
                    debug!(?order, aic = fit.aic, "arima order fitted");
                    if best.as_ref().map_or(true, |b| fit.aic < b.aic) {
                        best = Some(fit);
                    }
                }
                Err(e) => debug!(?order, error = %e, "arima order skipped"),
            }
        }

        best.ok_or_else(|| {
            warn!(orders = self.orders.len(), "no arima order could be fitted");
            ForecastError::ModelUnavailable("every ARIMA order failed to fit".to_string())
        })
    }
}

impl FittedArima {
    pub fn fit(values: &[f64], order: ArimaOrder) -> Result<Self> {
        let ArimaOrder { p, d, q } = order;

        let mut anchors = Vec::with_capacity(d);
        let mut working = values.to_vec();
        for _ in 0..d {
            let Some(&last) = working.last() else { break };
            anchors.push(last);
            working = stats::diff(&working);
        }

        let n_params = p + q + 1;
        if working.len() < OBS_PER_PARAMETER * n_params + p.max(q) + 10 {
            return Err(ForecastError::InsufficientData(format!(
                "ARIMA({},{},{}) needs more than {} observations",
                p,
                d,
                q,
                working.len()
            )));
        }

        let mean = stats::mean(&working).unwrap_or(0.0);
        let centered: Vec<f64> = working.iter().map(|v| v - mean).collect();

        let long_residuals = if q > 0 {
            long_ar_residuals(&centered, (p + q + 3).min(centered.len() / 4))?
        } else {
            vec![0.0; centered.len()]
        };

        let start = if q > 0 {
            (p + q + 3).min(centered.len() / 4) + q
        } else {
            p
        };
        let start = start.max(p).max(1);

        let (ar_coefficients, ma_coefficients) = if p + q == 0 {
            (Vec::new(), Vec::new())
        } else {
            let rows: Vec<Vec<f64>> = (start..centered.len())
                .map(|t| {
                    (1..=p)
                        .map(|i| centered[t - i])
                        .chain((1..=q).map(|j| long_residuals[t - j]))
                        .collect()
                })
                .collect();
            let coefficients = least_squares(&rows, &centered[start..])?;
            let (ar, ma) = coefficients.split_at(p);
            (ar.to_vec(), ma.to_vec())
        };

        if ar_coefficients.iter().map(|c| c.abs()).sum::<f64>() >= 1.0 {
            return Err(ForecastError::ModelUnavailable(format!(
                "ARIMA({},{},{}) estimate is not stationary",
                p, d, q
            )));
        }
        if ma_coefficients.iter().map(|c| c.abs()).sum::<f64>() >= 1.0 {
            return Err(ForecastError::ModelUnavailable(format!(
                "ARIMA({},{},{}) estimate is not invertible",
                p, d, q
            )));
        }

        let residuals = recursive_residuals(&centered, &ar_coefficients, &ma_coefficients);
        let burn_in = p.max(q);
        let effective = &residuals[burn_in..];
        let sigma2 = effective.iter().map(|e| e * e).sum::<f64>() / effective.len() as f64;
        if !(sigma2 > 0.0) || !sigma2.is_finite() {
            return Err(ForecastError::ModelUnavailable(format!(
                "ARIMA({},{},{}) residual variance is degenerate",
                p, d, q
            )));
        }

        let n = effective.len() as f64;
        let log_likelihood = -0.5 * n * ((2.0 * PI * sigma2).ln() + 1.0);
        // coefficients plus mean and innovation variance
        let k = (p + q + 2) as f64;
        let aic = 2.0 * k - 2.0 * log_likelihood;

        Ok(Self {
            order,
            ar_coefficients,
            ma_coefficients,
            mean,
            centered,
            residuals,
            anchors,
            sigma2,
            aic,
        })
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar_coefficients
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma_coefficients
    }

    /// Forecast `horizon` steps on the original (undifferenced) scale
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        let p = self.ar_coefficients.len();
        let q = self.ma_coefficients.len();

        let mut history = self.centered.clone();
        let mut shocks = self.residuals.clone();
        let mut forecasts = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let t = history.len();
            let ar: f64 = (1..=p)
                .map(|i| self.ar_coefficients[i - 1] * history[t - i])
                .sum();
            let ma: f64 = (1..=q)
                .map(|j| self.ma_coefficients[j - 1] * shocks[t - j])
                .sum();
            let next = ar + ma;
            history.push(next);
            // future shocks have expectation zero
            shocks.push(0.0);
            forecasts.push(next + self.mean);
        }

        // integrate back up through each differencing level
        for &anchor in self.anchors.iter().rev() {
            let mut level = anchor;
            for value in forecasts.iter_mut() {
                level += *value;
                *value = level;
            }
        }
        forecasts
    }
}

/// Residuals of a long pure-AR fit, zero for the first `lags` positions
fn long_ar_residuals(centered: &[f64], lags: usize) -> Result<Vec<f64>> {
    let lags = lags.max(1);
    let rows: Vec<Vec<f64>> = (lags..centered.len())
        .map(|t| (1..=lags).map(|i| centered[t - i]).collect())
        .collect();
    let coefficients = least_squares(&rows, &centered[lags..])?;

    let mut residuals = vec![0.0; centered.len()];
    for (t, row) in (lags..centered.len()).zip(&rows) {
        let fitted: f64 = row.iter().zip(&coefficients).map(|(x, c)| x * c).sum();
        residuals[t] = centered[t] - fitted;
    }
    Ok(residuals)
}

/// One-step residuals under the fitted ARMA, with zero pre-sample values
fn recursive_residuals(centered: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let mut residuals = vec![0.0; centered.len()];
    for t in 0..centered.len() {
        let ar_part: f64 = ar
            .iter()
            .enumerate()
            .filter(|(i, _)| t > *i)
            .map(|(i, c)| c * centered[t - i - 1])
            .sum();
        let ma_part: f64 = ma
            .iter()
            .enumerate()
            .filter(|(j, _)| t > *j)
            .map(|(j, c)| c * residuals[t - j - 1])
            .sum();
        residuals[t] = centered[t] - ar_part - ma_part;
    }
    residuals
}

impl ForecastModel for ArimaModel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Arima
    }

    fn forecast(&self, series: &ReturnSeries, horizon: usize) -> Result<ForecastResult> {
        check_horizon(horizon)?;
        let fit = self.select(series.values())?;
        debug!(order = ?fit.order(), aic = fit.aic(), "arima order selected");
        ForecastResult::new(StrategyKind::Arima, fit.forecast(horizon), horizon)
    }
}
