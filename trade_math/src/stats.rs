//! Descriptive statistics over return slices
//!
//! Conventions follow the ones financial code usually inherits from pandas:
//! [`std_dev`] is the sample (ddof = 1) estimator and [`percentile`] uses
//! linear interpolation between closest ranks.

use crate::{MathError, Result};

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (denominator `n - 1`), `None` for fewer than two values
pub fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    Some(ss / (values.len() - 1) as f64)
}

/// Sample standard deviation (denominator `n - 1`)
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// Population variance (denominator `n`)
pub fn population_variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// First differences `x[i+1] - x[i]`
pub fn diff(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Mean of the absolute first differences, `None` with fewer than two values
pub fn mean_abs_diff(values: &[f64]) -> Option<f64> {
    let d = diff(values);
    mean(&d.iter().map(|x| x.abs()).collect::<Vec<_>>())
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is expressed in percent (`5.0` is the 5th percentile). Matches numpy's
/// default `percentile` method.
pub fn percentile(values: &[f64], q: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot take a percentile of an empty slice".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&q) {
        return Err(MathError::InvalidInput(format!(
            "Percentile must be within [0, 100], got {}",
            q
        )));
    }
    if values.iter().any(|v| v.is_nan()) {
        return Err(MathError::InvalidInput(
            "Cannot take a percentile of a slice containing NaN".to_string(),
        ));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Mean squared error between two equally long slices
pub fn mean_squared_error(predicted: &[f64], actual: &[f64]) -> Result<f64> {
    check_paired(predicted, actual)?;
    Ok(predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).powi(2))
        .sum::<f64>()
        / predicted.len() as f64)
}

/// Mean absolute error between two equally long slices
pub fn mean_absolute_error(predicted: &[f64], actual: &[f64]) -> Result<f64> {
    check_paired(predicted, actual)?;
    Ok(predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / predicted.len() as f64)
}

/// Root mean squared error between two equally long slices
pub fn root_mean_squared_error(predicted: &[f64], actual: &[f64]) -> Result<f64> {
    mean_squared_error(predicted, actual).map(f64::sqrt)
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn check_paired(predicted: &[f64], actual: &[f64]) -> Result<()> {
    if predicted.is_empty() || predicted.len() != actual.len() {
        return Err(MathError::InvalidInput(format!(
            "Predicted ({}) and actual ({}) must have the same non-zero length",
            predicted.len(),
            actual.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // population std is 2.0, sample std is sqrt(32/7)
        assert_relative_eq!(std_dev(&values).unwrap(), (32.0f64 / 7.0).sqrt());
        assert_relative_eq!(population_variance(&values).unwrap(), 4.0);
        assert!(std_dev(&[1.0]).is_none());
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile(&values, 50.0).unwrap(), 2.5);
        assert_relative_eq!(percentile(&values, 0.0).unwrap(), 1.0);
        assert_relative_eq!(percentile(&values, 100.0).unwrap(), 4.0);
        // rank = 0.05 * 3 = 0.15
        assert_relative_eq!(percentile(&values, 5.0).unwrap(), 1.15);
    }

    #[test]
    fn test_percentile_rejects_bad_input() {
        assert!(percentile(&[], 5.0).is_err());
        assert!(percentile(&[1.0], 101.0).is_err());
        assert!(percentile(&[1.0, f64::NAN], 50.0).is_err());
    }

    #[test]
    fn test_error_metrics() {
        let predicted = [12.0, 18.0, 33.0, 37.0, 52.0];
        let actual = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_relative_eq!(mean_absolute_error(&predicted, &actual).unwrap(), 2.4);
        assert_relative_eq!(mean_squared_error(&predicted, &actual).unwrap(), 6.0);
        assert!(mean_squared_error(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_mean_abs_diff() {
        assert_relative_eq!(mean_abs_diff(&[1.0, 3.0, 2.0]).unwrap(), 1.5);
        assert!(mean_abs_diff(&[1.0]).is_none());
    }
}
