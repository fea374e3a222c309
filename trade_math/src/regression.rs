//! Ordinary least squares
//!
//! [`LinearFit`] regresses a series on its index position (the degree-1
//! polynomial fit used for trend extrapolation). [`least_squares`] solves a
//! general design matrix through an SVD so rank-deficient systems fail
//! cleanly instead of producing garbage coefficients.

use crate::{MathError, Result};
use nalgebra::{DMatrix, DVector};

/// Degree-1 least-squares fit of values against their index positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    slope: f64,
    intercept: f64,
    r_squared: Option<f64>,
    len: usize,
}

impl LinearFit {
    /// Fit `y = slope * i + intercept` over `i = 0..values.len()`
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.len() < 2 {
            return Err(MathError::InsufficientData(
                "Not enough data for a linear fit. Need at least 2 points.".to_string(),
            ));
        }

        let n = values.len() as f64;
        let x_mean = (n - 1.0) / 2.0;
        let y_mean = values.iter().sum::<f64>() / n;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, &y) in values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            numerator += dx * (y - y_mean);
            denominator += dx * dx;
        }

        if denominator.abs() < 1e-12 {
            return Err(MathError::CalculationError(
                "Cannot calculate slope: x values are too similar".to_string(),
            ));
        }

        let slope = numerator / denominator;
        let intercept = y_mean - slope * x_mean;

        let mut ss_total = 0.0;
        let mut ss_residual = 0.0;
        for (i, &y) in values.iter().enumerate() {
            let fitted = slope * i as f64 + intercept;
            ss_total += (y - y_mean).powi(2);
            ss_residual += (y - fitted).powi(2);
        }
        let r_squared = (ss_total > 1e-15).then(|| 1.0 - ss_residual / ss_total);

        if !slope.is_finite() || !intercept.is_finite() {
            return Err(MathError::CalculationError(
                "Linear fit produced non-finite coefficients".to_string(),
            ));
        }

        Ok(Self {
            slope,
            intercept,
            r_squared,
            len: values.len(),
        })
    }

    /// Value of the fitted line at index position `x`
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Extrapolate `steps_ahead` positions past the last fitted point
    pub fn forecast(&self, steps_ahead: usize) -> f64 {
        self.predict((self.len - 1 + steps_ahead) as f64)
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Coefficient of determination, `None` when the values are constant
    pub fn r_squared(&self) -> Option<f64> {
        self.r_squared
    }
}

/// Solve `min ||X b - y||²` for `b`.
///
/// `rows` holds one design-matrix row per observation; every row must have
/// the same width and there must be at least as many rows as columns.
pub fn least_squares(rows: &[Vec<f64>], target: &[f64]) -> Result<Vec<f64>> {
    if rows.is_empty() || rows.len() != target.len() {
        return Err(MathError::InvalidInput(format!(
            "Design matrix has {} rows but target has {} values",
            rows.len(),
            target.len()
        )));
    }
    let width = rows[0].len();
    if width == 0 || rows.iter().any(|r| r.len() != width) {
        return Err(MathError::InvalidInput(
            "Design matrix rows must share a non-zero width".to_string(),
        ));
    }
    if rows.len() < width {
        return Err(MathError::InsufficientData(format!(
            "Need at least {} observations for {} regressors, got {}",
            width,
            width,
            rows.len()
        )));
    }

    let design = DMatrix::from_fn(rows.len(), width, |i, j| rows[i][j]);
    let y = DVector::from_column_slice(target);

    let svd = design.svd(true, true);
    let max_singular = svd.singular_values.max();
    let min_singular = svd.singular_values.min();
    if !max_singular.is_finite() || min_singular <= max_singular * 1e-10 {
        return Err(MathError::CalculationError(
            "Design matrix is singular or ill-conditioned".to_string(),
        ));
    }

    let solution = svd
        .solve(&y, 1e-12)
        .map_err(|e| MathError::CalculationError(e.to_string()))?;

    if solution.iter().any(|c| !c.is_finite()) {
        return Err(MathError::CalculationError(
            "Least squares produced non-finite coefficients".to_string(),
        ));
    }

    Ok(solution.iter().copied().collect())
}
