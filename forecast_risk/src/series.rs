//! Return series handling for forecasting

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sampling frequency inferred from timestamp spacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    /// Every calendar day
    Daily,
    /// Weekdays only, weekends skipped
    BusinessDaily,
    /// Anything else, including series too short to tell
    Irregular,
}

impl Frequency {
    /// Whether weekly/yearly seasonal patterns are meaningful at this frequency
    pub fn is_daily_like(self) -> bool {
        matches!(self, Frequency::Daily | Frequency::BusinessDaily)
    }
}

/// Ordered sequence of (timestamp, fractional return) pairs.
///
/// Timestamps are strictly increasing and every value is finite. Forecasters
/// only ever borrow a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl ReturnSeries {
    /// Build a series, checking ordering and finiteness
    pub fn new(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(ForecastError::DataQuality(format!(
                "Timestamps length ({}) doesn't match values length ({})",
                timestamps.len(),
                values.len()
            )));
        }
        if let Some(pos) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(ForecastError::DataQuality(format!(
                "Timestamps must be strictly increasing (violated at {})",
                timestamps[pos + 1]
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ForecastError::DataQuality(format!(
                "Return series contains non-finite value {}",
                bad
            )));
        }

        Ok(Self { timestamps, values })
    }

    /// Build a series of consecutive calendar days starting at `start`
    pub fn daily(start: DateTime<Utc>, values: Vec<f64>) -> Result<Self> {
        let timestamps = (0..values.len())
            .map(|i| start + Duration::days(i as i64))
            .collect();
        Self::new(timestamps, values)
    }

    /// Percent-change returns from a close-price path.
    ///
    /// The first price has no predecessor, so the resulting series is one
    /// observation shorter and starts at the second timestamp.
    pub fn from_prices(timestamps: Vec<DateTime<Utc>>, prices: &[f64]) -> Result<Self> {
        if timestamps.len() != prices.len() {
            return Err(ForecastError::DataQuality(format!(
                "Timestamps length ({}) doesn't match prices length ({})",
                timestamps.len(),
                prices.len()
            )));
        }
        if prices.len() < 2 {
            return Err(ForecastError::InsufficientData(
                "Need at least two prices to compute returns".to_string(),
            ));
        }
        if let Some(bad) = prices.iter().find(|p| !p.is_finite() || **p <= 0.0) {
            return Err(ForecastError::DataQuality(format!(
                "Prices must be finite and positive, got {}",
                bad
            )));
        }

        let values = prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
        Self::new(timestamps[1..].to_vec(), values)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Most recent observed return
    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// The first `len` observations, as used for growing backtest windows
    pub fn head(&self, len: usize) -> ReturnSeries {
        let len = len.min(self.len());
        ReturnSeries {
            timestamps: self.timestamps[..len].to_vec(),
            values: self.values[..len].to_vec(),
        }
    }

    /// The last `len` values (or all of them when the series is shorter)
    pub fn tail_values(&self, len: usize) -> &[f64] {
        &self.values[self.len().saturating_sub(len)..]
    }

    /// Stable 64-bit content hash over timestamps and value bits
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Sha256::new();
        for (ts, v) in self.timestamps.iter().zip(&self.values) {
            hasher.update(ts.timestamp_millis().to_le_bytes());
            hasher.update(v.to_bits().to_le_bytes());
        }
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(head)
    }

    /// Infer the sampling frequency from timestamp spacing
    pub fn frequency(&self) -> Frequency {
        if self.len() < 3 {
            return Frequency::Irregular;
        }

        let gaps: Vec<i64> = self
            .timestamps
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds())
            .collect();
        let day = Duration::days(1).num_seconds();

        if gaps.iter().all(|&g| g == day) {
            return Frequency::Daily;
        }

        let weekdays_only = self
            .timestamps
            .iter()
            .all(|ts| !matches!(ts.weekday(), Weekday::Sat | Weekday::Sun));
        let business_gaps = self.timestamps.windows(2).zip(&gaps).all(|(w, &g)| {
            g == day || (g == 3 * day && w[0].weekday() == Weekday::Fri)
        });

        if weekdays_only && business_gaps {
            Frequency::BusinessDaily
        } else {
            Frequency::Irregular
        }
    }

    /// Timestamps for the next `horizon` periods at the inferred frequency
    pub fn future_timestamps(&self, horizon: usize) -> Vec<DateTime<Utc>> {
        let Some(mut current) = self.last_timestamp() else {
            return Vec::new();
        };
        let frequency = self.frequency();

        let mut timestamps = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            current = current + Duration::days(1);
            if frequency == Frequency::BusinessDaily {
                while matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                    current = current + Duration::days(1);
                }
            }
            timestamps.push(current);
        }
        timestamps
    }

    /// Values re-indexed onto `index`; dates this series lacks contribute 0
    pub fn aligned_to(&self, index: &[DateTime<Utc>]) -> Vec<f64> {
        index
            .iter()
            .map(|ts| match self.timestamps.binary_search(ts) {
                Ok(pos) => self.values[pos],
                Err(_) => 0.0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_from_prices_computes_pct_change() {
        let timestamps: Vec<_> = (0..3).map(|i| monday() + Duration::days(i)).collect();
        let series = ReturnSeries::from_prices(timestamps, &[100.0, 110.0, 99.0]).unwrap();

        assert_eq!(series.len(), 2);
        assert_relative_eq!(series.values()[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(series.values()[1], -0.10, epsilon = 1e-12);
        assert_eq!(series.timestamps()[0], monday() + Duration::days(1));
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let timestamps = vec![monday() + Duration::days(1), monday()];
        assert!(matches!(
            ReturnSeries::new(timestamps, vec![0.1, 0.2]),
            Err(ForecastError::DataQuality(_))
        ));
    }

    #[test]
    fn test_frequency_inference() {
        let daily = ReturnSeries::daily(monday(), vec![0.0; 10]).unwrap();
        assert_eq!(daily.frequency(), Frequency::Daily);

        let business: Vec<_> = (0..15)
            .map(|i| monday() + Duration::days(i))
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .collect();
        let n = business.len();
        let series = ReturnSeries::new(business, vec![0.0; n]).unwrap();
        assert_eq!(series.frequency(), Frequency::BusinessDaily);

        let future = series.future_timestamps(3);
        assert!(future
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = ReturnSeries::daily(monday(), vec![0.01, 0.02, 0.03]).unwrap();
        let b = ReturnSeries::daily(monday(), vec![0.01, 0.02, 0.03]).unwrap();
        let c = ReturnSeries::daily(monday(), vec![0.01, 0.02, 0.031]).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_aligned_to_fills_missing_with_zero() {
        let series = ReturnSeries::daily(monday(), vec![0.01, 0.02]).unwrap();
        let index = vec![monday(), monday() + Duration::days(5)];
        assert_eq!(series.aligned_to(&index), vec![0.01, 0.0]);
    }
}
