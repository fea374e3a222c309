//! Error types for the forecast_risk crate

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trade_math::MathError;

/// Custom error types for the forecast_risk crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Too few valid observations for sanitization, backtesting or a model window
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A strategy's dependency is missing or every fit attempt failed
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Values that are non-numeric or non-finite and cannot be coerced
    #[error("Data quality error: {0}")]
    DataQuality(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error from configuration loading
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from numeric primitives
    #[error("Math error: {0}")]
    Math(#[from] MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from JSON serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`ForecastError`], used by the fallback policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientData,
    ModelUnavailable,
    DataQuality,
    InvalidParameter,
    Internal,
}

impl ForecastError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::InsufficientData(_) => ErrorKind::InsufficientData,
            ForecastError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            ForecastError::DataQuality(_) => ErrorKind::DataQuality,
            ForecastError::InvalidParameter(_) | ForecastError::Config(_) => {
                ErrorKind::InvalidParameter
            }
            ForecastError::Math(MathError::InsufficientData(_)) => ErrorKind::InsufficientData,
            ForecastError::Math(_)
            | ForecastError::Io(_)
            | ForecastError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::Config(err.to_string())
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_errors_map_to_kinds() {
        let err: ForecastError = MathError::InsufficientData("two points".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);

        let err: ForecastError = MathError::CalculationError("singular".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("singular"));
    }
}
