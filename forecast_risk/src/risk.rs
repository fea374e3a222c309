//! Tail-risk metrics over return series
//!
//! All functions are pure and treat empty or degenerate input as a zero
//! result. Confidence levels are fractions (`0.95`); monetary amounts are
//! reported as absolute loss magnitudes rounded to cents.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;
use trade_math::stats::{self, round_to};

/// Trading days per year, the Sharpe ratio's annualization divisor
pub const TRADING_DAYS: f64 = 252.0;

fn tail_threshold(returns: &[f64], confidence: f64) -> Option<f64> {
    stats::percentile(returns, (1.0 - confidence) * 100.0).ok()
}

/// Historical Value-at-Risk: the `(1 - confidence)` percentile of `returns`
/// scaled by `value`, as a positive loss amount
pub fn value_at_risk(returns: &[f64], value: f64, confidence: f64) -> f64 {
    match tail_threshold(returns, confidence) {
        Some(threshold) => round_to((threshold * value).abs(), 2),
        None => 0.0,
    }
}

/// Conditional VaR: mean of the returns at or below the VaR threshold,
/// scaled by `value`
pub fn conditional_value_at_risk(returns: &[f64], value: f64, confidence: f64) -> f64 {
    let Some(threshold) = tail_threshold(returns, confidence) else {
        return 0.0;
    };
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= threshold).collect();
    match stats::mean(&tail) {
        Some(mean) => round_to((mean * value).abs(), 2),
        None => 0.0,
    }
}

/// Daily Sharpe ratio against an annual risk-free rate, rounded to 2 decimals.
/// Zero when the deviation is zero or undefined.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let (Some(mean), Some(std)) = (stats::mean(returns), stats::std_dev(returns)) else {
        return 0.0;
    };
    if !(std > 0.0) {
        return 0.0;
    }
    let ratio = (mean - risk_free_rate / TRADING_DAYS) / std;
    if ratio.is_finite() {
        round_to(ratio, 2)
    } else {
        0.0
    }
}

/// Deepest peak-to-trough fall of a value path, as a negative percentage
/// rounded to 4 decimals
pub fn max_drawdown_from_prices(prices: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut deepest = 0.0_f64;
    for &price in prices {
        peak = peak.max(price);
        if peak > 0.0 {
            deepest = deepest.min((price - peak) / peak);
        }
    }
    round_to(deepest * 100.0, 4)
}

/// Max drawdown of the compounded growth path `Π (1 + r)`
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut growth = 1.0;
    let path: Vec<f64> = returns
        .iter()
        .map(|r| {
            growth *= 1.0 + r;
            growth
        })
        .collect();
    max_drawdown_from_prices(&path)
}

/// Forward VaR as a return: `mean(forecast) + z(1 - confidence) · mean(volatility)`
pub fn parametric_var(forecast: &[f64], volatility: &[f64], confidence: f64) -> Result<f64> {
    let z = standard_normal_quantile(1.0 - confidence)?;
    let mean = stats::mean(forecast).unwrap_or(0.0);
    let vol = stats::mean(volatility).unwrap_or(0.0);
    Ok(mean + z * vol)
}

fn standard_normal_quantile(p: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "Quantile probability must lie in (0, 1), got {}",
            p
        )));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| ForecastError::InvalidParameter(e.to_string()))?;
    Ok(normal.inverse_cdf(p))
}

/// VaR, CVaR, Sharpe and max drawdown of one return series
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub var: f64,
    pub cvar: f64,
    pub sharpe: f64,
    /// Negative percentage
    pub max_drawdown: f64,
}

impl RiskSnapshot {
    pub fn compute(returns: &[f64], value: f64, confidence: f64, risk_free_rate: f64) -> Self {
        Self {
            var: value_at_risk(returns, value, confidence),
            cvar: conditional_value_at_risk(returns, value, confidence),
            sharpe: sharpe_ratio(returns, risk_free_rate),
            max_drawdown: max_drawdown(returns),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
            RiskLevel::VeryHigh => "Very High",
        };
        f.write_str(label)
    }
}

/// Most recommendations included in an assessment
pub const MAX_RECOMMENDATIONS: usize = 3;

/// Inputs to [`assess`]: portfolio figures plus each holding's forecast VaR
#[derive(Debug, Clone, Default)]
pub struct AssessmentInput<'a> {
    pub var: f64,
    pub cvar: f64,
    /// Total profit or loss as a percentage of the position value
    pub return_pct: f64,
    pub max_drawdown: f64,
    pub value: f64,
    pub forecast_days: usize,
    /// `(name, forecast VaR amount, position value)` per holding
    pub holdings: Vec<(&'a str, f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub recommendations: Vec<String>,
}

impl RiskAssessment {
    /// Recommendations joined into one sentence list
    pub fn summary(&self) -> String {
        self.recommendations.join(". ")
    }
}

/// Classify the portfolio and produce up to three recommendations
pub fn assess(input: &AssessmentInput<'_>) -> RiskAssessment {
    let (var_ratio, cvar_ratio) = if input.value > 0.0 {
        (input.var / input.value, input.cvar / input.value)
    } else {
        (0.0, 0.0)
    };
    let drawdown = input.max_drawdown.abs();

    let level = if var_ratio > 0.15 || cvar_ratio > 0.20 || drawdown > 30.0 {
        RiskLevel::VeryHigh
    } else if var_ratio > 0.10 || cvar_ratio > 0.15 || drawdown > 20.0 {
        RiskLevel::High
    } else if var_ratio > 0.05 || cvar_ratio > 0.10 || drawdown > 10.0 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    };

    let mut recommendations = Vec::new();
    if input.return_pct > 20.0 {
        recommendations.push("Strong performance! Consider taking some profits".to_string());
    } else if input.return_pct < -10.0 {
        recommendations.push("Significant losses. Review your investment strategy".to_string());
    }
    if var_ratio > 0.10 {
        recommendations.push("High volatility detected. Consider diversifying your portfolio".to_string());
    }
    if drawdown > 20.0 {
        recommendations.push("Large drawdowns observed. Consider risk management strategies".to_string());
    }

    let risky: Vec<&str> = input
        .holdings
        .iter()
        .filter(|(_, forecast_var, position)| *position > 0.0 && forecast_var / position > 0.15)
        .map(|(name, _, _)| *name)
        .collect();
    if !risky.is_empty() {
        recommendations.push(format!(
            "High-risk stocks detected: {}. Consider reducing exposure",
            risky.join(", ")
        ));
    }
    if input.forecast_days > 180 {
        recommendations.push("Long-term forecast shows increased uncertainty. Monitor regularly".to_string());
    }

    if recommendations.is_empty() {
        let default = if level == RiskLevel::Low {
            "Portfolio looks well-balanced. Continue current strategy"
        } else {
            "Monitor portfolio performance and adjust as needed"
        };
        recommendations.push(default.to_string());
    }
    recommendations.truncate(MAX_RECOMMENDATIONS);

    RiskAssessment {
        level,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[test]
    fn test_var_and_cvar() {
        let returns: Vec<f64> = (1..=20).map(|i| (i as f64 - 11.0) / 100.0).collect();
        // 5th percentile of -0.10..0.09 step 0.01 is -0.0905
        assert_abs_diff_eq!(value_at_risk(&returns, 1000.0, 0.95), 90.5);
        // only -0.10 lies at or below the threshold
        assert_abs_diff_eq!(conditional_value_at_risk(&returns, 1000.0, 0.95), 100.0);
    }

    #[test]
    fn test_empty_input_is_zero() {
        assert_eq!(value_at_risk(&[], 1000.0, 0.95), 0.0);
        assert_eq!(conditional_value_at_risk(&[], 1000.0, 0.95), 0.0);
        assert_eq!(sharpe_ratio(&[], 0.05), 0.0);
        assert_eq!(sharpe_ratio(&[0.5, 0.5, 0.5], 0.05), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_sharpe_ratio() {
        let returns = [0.01, 0.02, 0.03];
        // mean 0.02, std 0.01
        let expected = round_to((0.02 - 0.05 / 252.0) / 0.01, 2);
        assert_abs_diff_eq!(sharpe_ratio(&returns, 0.05), expected);
    }

    #[test]
    fn test_max_drawdown() {
        assert_abs_diff_eq!(max_drawdown(&[0.1, -0.5, 0.2]), -50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(max_drawdown_from_prices(&[100.0, 120.0, 90.0, 130.0]), -25.0);
        assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
    }

    #[test]
    fn test_parametric_var() {
        let var = parametric_var(&[0.001; 5], &[0.02; 5], 0.95).unwrap();
        assert_abs_diff_eq!(var, 0.001 - 1.6448536 * 0.02, epsilon = 1e-6);
        assert!(parametric_var(&[0.0], &[0.0], 1.0).is_err());
    }

    #[rstest]
    #[case(200.0, 0.0, 0.0, RiskLevel::VeryHigh)]
    #[case(0.0, 160.0, 0.0, RiskLevel::High)]
    #[case(0.0, 0.0, -15.0, RiskLevel::Moderate)]
    #[case(10.0, 20.0, -2.0, RiskLevel::Low)]
    fn test_risk_levels(#[case] var: f64, #[case] cvar: f64, #[case] drawdown: f64, #[case] expected: RiskLevel) {
        let input = AssessmentInput {
            var,
            cvar,
            max_drawdown: drawdown,
            value: 1000.0,
            forecast_days: 30,
            ..AssessmentInput::default()
        };
        assert_eq!(assess(&input).level, expected);
    }

    #[test]
    fn test_recommendations_are_capped() {
        let input = AssessmentInput {
            var: 150.0,
            cvar: 150.0,
            return_pct: 25.0,
            max_drawdown: -25.0,
            value: 1000.0,
            forecast_days: 365,
            holdings: vec![("AAA", 40.0, 100.0)],
        };
        let assessment = assess(&input);
        assert_eq!(assessment.recommendations.len(), 3);
        assert!(assessment.summary().starts_with("Strong performance!"));
        assert!(!assessment.summary().contains("High-risk stocks"));
    }

    #[test]
    fn test_default_recommendation() {
        let input = AssessmentInput {
            value: 1000.0,
            forecast_days: 30,
            ..AssessmentInput::default()
        };
        assert_eq!(
            assess(&input).summary(),
            "Portfolio looks well-balanced. Continue current strategy"
        );
    }
}
