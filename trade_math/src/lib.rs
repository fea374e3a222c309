//! # Trade Math
//!
//! Numeric building blocks for return forecasting and risk measurement.
//! Everything here works on plain `f64` slices so the forecasting crate can
//! stay independent of any particular series representation.
//!
//! - [`stats`]: descriptive statistics and numpy-compatible percentiles
//! - [`regression`]: ordinary least squares, both single-regressor line fits
//!   and general design-matrix solves
//! - [`scaling`]: min-max scaling with inverse transform
//! - [`optimize`]: a derivative-free Nelder-Mead minimizer

use thiserror::Error;

pub mod optimize;
pub mod regression;
pub mod scaling;
pub mod stats;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;

pub use regression::{least_squares, LinearFit};
pub use scaling::MinMaxScaler;
