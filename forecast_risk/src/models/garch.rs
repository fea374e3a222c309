//! GARCH-family volatility models
//!
//! Three variants are fitted by Gaussian maximum likelihood (Nelder-Mead on
//! the negative log-likelihood) and the lowest-AIC fit forecasts the
//! conditional volatility path. When nothing fits, the sample standard
//! deviation is broadcast over the horizon.

use crate::error::{ForecastError, Result};
use crate::models::{check_horizon, ForecastModel, ForecastResult, StrategyKind};
use crate::series::ReturnSeries;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_2_PI, PI};
use tracing::{debug, warn};
use trade_math::optimize::{nelder_mead, NelderMeadOptions};
use trade_math::stats;

/// Returns are fitted in percent to keep the likelihood well scaled
const SCALE: f64 = 100.0;

/// Fewest observations a variant is fitted on
const MIN_FIT_POINTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GarchVariant {
    /// GARCH(1,1)
    Garch11,
    /// Exponential GARCH(1,1), symmetric
    Egarch11,
    /// GARCH(2,2)
    Garch22,
}

impl GarchVariant {
    pub const ALL: [GarchVariant; 3] = [
        GarchVariant::Garch11,
        GarchVariant::Egarch11,
        GarchVariant::Garch22,
    ];

    /// (ARCH order, GARCH order)
    fn orders(self) -> (usize, usize) {
        match self {
            GarchVariant::Garch11 | GarchVariant::Egarch11 => (1, 1),
            GarchVariant::Garch22 => (2, 2),
        }
    }

    fn start(self, variance: f64) -> Vec<f64> {
        match self {
            GarchVariant::Garch11 => vec![0.1 * variance, 0.1, 0.8],
            GarchVariant::Garch22 => vec![0.1 * variance, 0.05, 0.05, 0.4, 0.4],
            GarchVariant::Egarch11 => vec![0.1 * variance.ln(), 0.1, 0.9],
        }
    }
}

/// A fitted volatility model
#[derive(Debug, Clone)]
pub struct FittedGarch {
    variant: GarchVariant,
    params: Vec<f64>,
    /// Scaled residuals
    residuals: Vec<f64>,
    /// Scaled conditional variances, aligned with `residuals`
    variances: Vec<f64>,
    aic: f64,
}

impl FittedGarch {
    pub fn fit(values: &[f64], variant: GarchVariant) -> Result<Self> {
        if values.len() < MIN_FIT_POINTS {
            return Err(ForecastError::InsufficientData(format!(
                "{:?} needs at least {} observations, got {}",
                variant,
                MIN_FIT_POINTS,
                values.len()
            )));
        }

        let mean = stats::mean(values).unwrap_or(0.0);
        let residuals: Vec<f64> = values.iter().map(|v| (v - mean) * SCALE).collect();
        let variance = stats::population_variance(&residuals).unwrap_or(0.0);
        if !(variance > 0.0) {
            return Err(ForecastError::ModelUnavailable(
                "volatility model needs non-constant returns".to_string(),
            ));
        }

        let objective = |params: &[f64]| match conditional_variances(variant, params, &residuals, variance) {
            Some(h) => negative_log_likelihood(&residuals, &h),
            None => f64::INFINITY,
        };
        let options = NelderMeadOptions {
            max_iterations: 2000,
            ..NelderMeadOptions::default()
        };
        let minimum = nelder_mead(objective, &variant.start(variance), options)?;

        let variances = conditional_variances(variant, &minimum.point, &residuals, variance)
            .ok_or_else(|| {
                ForecastError::ModelUnavailable(format!("{:?} optimum is infeasible", variant))
            })?;

        // model parameters plus the mean
        let k = (minimum.point.len() + 1) as f64;
        let aic = 2.0 * k + 2.0 * minimum.value;
        if !aic.is_finite() {
            return Err(ForecastError::ModelUnavailable(format!(
                "{:?} likelihood did not converge",
                variant
            )));
        }

        Ok(Self {
            variant,
            params: minimum.point,
            residuals,
            variances,
            aic,
        })
    }

    pub fn variant(&self) -> GarchVariant {
        self.variant
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    /// Conditional volatility for the next `horizon` periods, in return units
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        let mut shocks = self.residuals.iter().map(|e| e * e).collect::<Vec<_>>();
        let mut variances = self.variances.clone();
        let mut path = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let next = match self.variant {
                GarchVariant::Egarch11 => {
                    let (omega, alpha, beta) = (self.params[0], self.params[1], self.params[2]);
                    let t = variances.len();
                    // the |z| term only contributes for the first step
                    let surprise = if t == self.residuals.len() {
                        let z = self.residuals[t - 1] / variances[t - 1].sqrt();
                        alpha * (z.abs() - FRAC_2_PI.sqrt())
                    } else {
                        0.0
                    };
                    (omega + surprise + beta * variances[t - 1].ln()).exp()
                }
                GarchVariant::Garch11 | GarchVariant::Garch22 => {
                    garch_step(self.variant, &self.params, &shocks, &variances)
                }
            };
            variances.push(next);
            // expected squared shock equals the conditional variance
            shocks.push(next);
            path.push(next.sqrt() / SCALE);
        }
        path
    }
}

/// Variance recursion; `None` when the parameters violate the variant's constraints
fn conditional_variances(
    variant: GarchVariant,
    params: &[f64],
    residuals: &[f64],
    initial: f64,
) -> Option<Vec<f64>> {
    match variant {
        GarchVariant::Garch11 | GarchVariant::Garch22 => {
            let (arch, garch) = variant.orders();
            let omega = params[0];
            let coefficients = &params[1..=arch + garch];
            if omega <= 0.0
                || coefficients.iter().any(|c| *c < 0.0)
                || coefficients.iter().sum::<f64>() >= 1.0
            {
                return None;
            }

            let shocks: Vec<f64> = residuals.iter().map(|e| e * e).collect();
            let mut variances: Vec<f64> = Vec::with_capacity(residuals.len());
            for t in 0..residuals.len() {
                let h = if t < arch.max(garch) {
                    initial
                } else {
                    garch_step(variant, params, &shocks[..t], &variances)
                };
                variances.push(h);
            }
            Some(variances)
        }
        GarchVariant::Egarch11 => {
            let (omega, alpha, beta) = (params[0], params[1], params[2]);
            if beta.abs() >= 1.0 {
                return None;
            }
            let mut log_h = initial.ln();
            let mut variances: Vec<f64> = Vec::with_capacity(residuals.len());
            for t in 0..residuals.len() {
                if t > 0 {
                    let z = residuals[t - 1] / variances[t - 1].sqrt();
                    log_h = omega + alpha * (z.abs() - FRAC_2_PI.sqrt()) + beta * log_h;
                }
                let h = log_h.exp();
                if !h.is_finite() || h <= 0.0 {
                    return None;
                }
                variances.push(h);
            }
            Some(variances)
        }
    }
}

/// Next variance of a GARCH(p, q) given the history so far
fn garch_step(variant: GarchVariant, params: &[f64], shocks: &[f64], variances: &[f64]) -> f64 {
    let (arch, garch) = variant.orders();
    let t = variances.len();
    let mut h = params[0];
    for i in 1..=arch {
        h += params[i] * shocks[t - i];
    }
    for j in 1..=garch {
        h += params[arch + j] * variances[t - j];
    }
    h
}

fn negative_log_likelihood(residuals: &[f64], variances: &[f64]) -> f64 {
    0.5 * residuals
        .iter()
        .zip(variances)
        .map(|(e, h)| (2.0 * PI).ln() + h.ln() + e * e / h)
        .sum::<f64>()
}

/// Volatility path plus the variant that produced it, `None` for the
/// sample-deviation fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityForecast {
    pub path: Vec<f64>,
    pub variant: Option<GarchVariant>,
}

#[derive(Debug, Clone)]
pub struct GarchModel {
    variants: Vec<GarchVariant>,
}

impl Default for GarchModel {
    fn default() -> Self {
        Self {
            variants: GarchVariant::ALL.to_vec(),
        }
    }
}

impl GarchModel {
    pub fn new(variants: Vec<GarchVariant>) -> Self {
        Self { variants }
    }

    /// The sample standard deviation repeated over the horizon
    pub fn sample_std_path(values: &[f64], horizon: usize) -> Result<Vec<f64>> {
        let std = stats::std_dev(values).ok_or_else(|| {
            ForecastError::InsufficientData(
                "Volatility needs at least two observations".to_string(),
            )
        })?;
        Ok(vec![std; horizon])
    }

    /// Fit every variant, forecast with the lowest-AIC one, or fall back to
    /// the sample standard deviation
    pub fn forecast_volatility(&self, values: &[f64], horizon: usize) -> Result<VolatilityForecast> {
        let mut best: Option<FittedGarch> = None;
        for &variant in &self.variants {
            match FittedGarch::fit(values, variant) {
                Ok(fit) => {
                    debug!(?variant, aic = fit.aic(), "volatility variant fitted");
                    if best.as_ref().map_or(true, |b| fit.aic() < b.aic()) {
                        best = Some(fit);
                    }
                }
                Err(e) => debug!(?variant, error = %e, "volatility variant skipped"),
            }
        }

        match best {
            Some(fit) => {
                let path = fit.forecast(horizon);
                if path.iter().all(|v| v.is_finite()) {
                    return Ok(VolatilityForecast {
                        path,
                        variant: Some(fit.variant()),
                    });
                }
                warn!(variant = ?fit.variant(), "volatility forecast diverged, using sample deviation");
            }
            None => warn!("no volatility variant could be fitted, using sample deviation"),
        }

        Ok(VolatilityForecast {
            path: Self::sample_std_path(values, horizon)?,
            variant: None,
        })
    }
}

impl ForecastModel for GarchModel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Garch
    }

    fn forecast(&self, series: &ReturnSeries, horizon: usize) -> Result<ForecastResult> {
        check_horizon(horizon)?;
        let forecast = self.forecast_volatility(series.values(), horizon)?;
        ForecastResult::new(StrategyKind::Garch, forecast.path, horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    fn garch_path(len: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let z = Normal::new(0.0, 1.0).unwrap();
        let (omega, alpha, beta) = (0.00001, 0.1, 0.85);
        let mut h: f64 = omega / (1.0 - alpha - beta);
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            let e = h.sqrt() * z.sample(&mut rng);
            values.push(e);
            h = omega + alpha * e * e + beta * h;
        }
        values
    }

    #[test]
    fn test_fits_and_forecasts_positive_path() {
        let values = garch_path(500, 5);
        let forecast = GarchModel::default().forecast_volatility(&values, 10).unwrap();

        assert_eq!(forecast.path.len(), 10);
        assert!(forecast.variant.is_some());
        assert!(forecast.path.iter().all(|v| *v > 0.0 && *v < 0.1));
    }

    #[test]
    fn test_each_variant_fits() {
        let values = garch_path(400, 9);
        for variant in GarchVariant::ALL {
            let fit = FittedGarch::fit(&values, variant).unwrap();
            assert!(fit.aic().is_finite());
            assert_eq!(fit.forecast(3).len(), 3);
        }
    }

    #[test]
    fn test_short_series_falls_back_to_sample_std() {
        let values = [0.01, -0.02, 0.015, 0.0, -0.005];
        let forecast = GarchModel::default().forecast_volatility(&values, 4).unwrap();
        let std = stats::std_dev(&values).unwrap();

        assert!(forecast.variant.is_none());
        assert_eq!(forecast.path, vec![std; 4]);
    }
}
