//! Cleaning of raw return observations before any model sees them
//!
//! Missing values are dropped, text is coerced where it parses, and extreme
//! outliers (more than ten sample standard deviations from the mean) are
//! trimmed. A cleaned series always holds at least five observations.

use crate::error::{ForecastError, Result};
use crate::series::ReturnSeries;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fewest observations a cleaned series may hold
pub const MIN_OBSERVATIONS: usize = 5;

/// Observations further than this many standard deviations from the mean are trimmed
pub const OUTLIER_STD_LIMIT: f64 = 10.0;

/// A raw value as delivered by an ingestion layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Missing,
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<Option<f64>> for RawValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(RawValue::Missing, RawValue::Number)
    }
}

/// One uncleaned (timestamp, return) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub timestamp: DateTime<Utc>,
    pub value: RawValue,
}

impl RawObservation {
    pub fn new(timestamp: DateTime<Utc>, value: impl Into<RawValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// Turns raw observations into a [`ReturnSeries`] that satisfies the
/// cleaning invariants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sanitizer {
    pub min_observations: usize,
    pub outlier_std_limit: f64,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            min_observations: MIN_OBSERVATIONS,
            outlier_std_limit: OUTLIER_STD_LIMIT,
        }
    }
}

impl Sanitizer {
    pub fn sanitize(&self, raw: &[RawObservation]) -> Result<ReturnSeries> {
        let mut valid = Vec::with_capacity(raw.len());
        for obs in raw {
            if let Some(value) = coerce(&obs.value, obs.timestamp)? {
                valid.push((obs.timestamp, value));
            }
        }
        let dropped_missing = raw.len() - valid.len();

        if valid.len() < self.min_observations {
            return Err(ForecastError::InsufficientData(format!(
                "need at least {} observations, got {}",
                self.min_observations,
                valid.len()
            )));
        }

        valid.sort_by_key(|(ts, _)| *ts);
        if let Some(pair) = valid.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(ForecastError::DataQuality(format!(
                "duplicate timestamp {}",
                pair[0].0
            )));
        }

        let values: Vec<f64> = valid.iter().map(|(_, v)| *v).collect();
        let kept = self.trim_outliers(&valid, &values);

        let (timestamps, values): (Vec<_>, Vec<_>) = kept.into_iter().unzip();
        debug!(
            input = raw.len(),
            dropped_missing,
            output = values.len(),
            "sanitized return series"
        );
        ReturnSeries::new(timestamps, values)
    }

    fn trim_outliers(
        &self,
        valid: &[(DateTime<Utc>, f64)],
        values: &[f64],
    ) -> Vec<(DateTime<Utc>, f64)> {
        let (Some(mean), Some(std)) = (
            trade_math::stats::mean(values),
            trade_math::stats::std_dev(values),
        ) else {
            return valid.to_vec();
        };
        if std <= 0.0 {
            return valid.to_vec();
        }

        let limit = self.outlier_std_limit * std;
        let trimmed: Vec<_> = valid
            .iter()
            .filter(|(_, v)| (v - mean).abs() <= limit)
            .copied()
            .collect();

        // Unreachable at the default 10σ limit: a point needs n > 100 to sit
        // that far from the mean. Tighter limits can trim below the minimum.
        if trimmed.len() < self.min_observations {
            warn!(
                remaining = trimmed.len(),
                "outlier trimming would leave too few observations, keeping untrimmed series"
            );
            return valid.to_vec();
        }
        if trimmed.len() < valid.len() {
            debug!(removed = valid.len() - trimmed.len(), "trimmed outliers");
        }
        trimmed
    }
}

/// Clean with the default limits
pub fn sanitize_returns(raw: &[RawObservation]) -> Result<ReturnSeries> {
    Sanitizer::default().sanitize(raw)
}

/// Clean a bare value sequence, assigning consecutive daily timestamps from `start`
pub fn sanitize_values(start: DateTime<Utc>, values: &[Option<f64>]) -> Result<ReturnSeries> {
    let raw: Vec<RawObservation> = values
        .iter()
        .enumerate()
        .map(|(i, v)| RawObservation::new(start + chrono::Duration::days(i as i64), *v))
        .collect();
    sanitize_returns(&raw)
}

fn coerce(value: &RawValue, timestamp: DateTime<Utc>) -> Result<Option<f64>> {
    let number = match value {
        RawValue::Missing => return Ok(None),
        RawValue::Number(n) => *n,
        RawValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty()
                || ["nan", "na", "n/a", "null", "none"]
                    .iter()
                    .any(|m| trimmed.eq_ignore_ascii_case(m))
            {
                return Ok(None);
            }
            trimmed.parse::<f64>().map_err(|_| {
                ForecastError::DataQuality(format!(
                    "non-numeric value '{}' at {}",
                    trimmed, timestamp
                ))
            })?
        }
    };

    if number.is_nan() {
        Ok(None)
    } else if number.is_infinite() {
        Err(ForecastError::DataQuality(format!(
            "non-finite value {} at {}",
            number, timestamp
        )))
    } else {
        Ok(Some(number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_values_are_dropped() {
        let values = [Some(0.01), None, Some(f64::NAN), Some(0.02), Some(-0.01), Some(0.0), Some(0.03)];
        let series = sanitize_values(start(), &values).unwrap();
        assert_eq!(series.values(), &[0.01, 0.02, -0.01, 0.0, 0.03]);
    }

    #[test]
    fn test_text_is_coerced_or_rejected() {
        let mut raw: Vec<RawObservation> = (0..5)
            .map(|i| RawObservation::new(start() + Duration::days(i), 0.01 * i as f64))
            .collect();
        raw.push(RawObservation {
            timestamp: start() + Duration::days(5),
            value: RawValue::Text(" 0.05 ".to_string()),
        });
        raw.push(RawObservation {
            timestamp: start() + Duration::days(6),
            value: RawValue::Text("NaN".to_string()),
        });
        assert_eq!(sanitize_returns(&raw).unwrap().len(), 6);

        raw.push(RawObservation {
            timestamp: start() + Duration::days(7),
            value: RawValue::Text("abc".to_string()),
        });
        assert!(matches!(
            sanitize_returns(&raw),
            Err(ForecastError::DataQuality(_))
        ));
    }

    #[test]
    fn test_infinite_values_are_rejected() {
        let values = [Some(0.01), Some(f64::INFINITY), Some(0.02), Some(0.0), Some(0.01)];
        assert!(matches!(
            sanitize_values(start(), &values),
            Err(ForecastError::DataQuality(_))
        ));
    }

    #[test]
    fn test_unsorted_input_is_ordered_and_duplicates_rejected() {
        let mut raw: Vec<RawObservation> = (0..6)
            .rev()
            .map(|i| RawObservation::new(start() + Duration::days(i), i as f64 / 100.0))
            .collect();
        let series = sanitize_returns(&raw).unwrap();
        assert!(series.timestamps().windows(2).all(|w| w[0] < w[1]));

        raw.push(RawObservation::new(start(), 0.5));
        assert!(matches!(
            sanitize_returns(&raw),
            Err(ForecastError::DataQuality(_))
        ));
    }

    #[test]
    fn test_extreme_outlier_is_trimmed() {
        let mut values: Vec<Option<f64>> = (0..200)
            .map(|i| Some(if i % 2 == 0 { 0.01 } else { -0.01 }))
            .collect();
        values[100] = Some(5.0);

        let series = sanitize_values(start(), &values).unwrap();
        assert_eq!(series.len(), 199);
        assert!(series.values().iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_tight_limit_keeps_untrimmed_series() {
        let sanitizer = Sanitizer {
            outlier_std_limit: 0.5,
            ..Sanitizer::default()
        };
        let raw: Vec<RawObservation> = (0..6)
            .map(|i| RawObservation::new(start() + Duration::days(i), if i % 2 == 0 { 0.01 } else { -0.01 }))
            .collect();

        let series = sanitizer.sanitize(&raw).unwrap();
        assert_eq!(series.len(), 6);
        assert_eq!(series.values()[1], -0.01);
    }
}
