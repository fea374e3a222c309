use chrono::{DateTime, Duration, TimeZone, Utc};
use forecast_risk::sanitize::{sanitize_returns, sanitize_values};
use forecast_risk::{ErrorKind, RawObservation, RawValue};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
}

#[test]
fn test_five_valid_points_pass() {
    let values = [Some(0.01), None, Some(-0.02), Some(0.0), Some(0.015), Some(0.003)];
    let series = sanitize_values(start(), &values).unwrap();
    assert_eq!(series.len(), 5);
}

#[test]
fn test_four_valid_points_fail() {
    let values = [Some(0.01), None, Some(-0.02), Some(0.0), Some(0.015), None];
    let err = sanitize_values(start(), &values).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
}

#[test]
fn test_mixed_raw_values() {
    let raw: Vec<RawObservation> = vec![
        RawObservation::new(start(), 0.01),
        RawObservation::new(start() + Duration::days(1), RawValue::Text(" 0.02 ".to_string())),
        RawObservation::new(start() + Duration::days(2), RawValue::Text("NaN".to_string())),
        RawObservation::new(start() + Duration::days(3), RawValue::Missing),
        RawObservation::new(start() + Duration::days(4), f64::NAN),
        RawObservation::new(start() + Duration::days(5), -0.01),
        RawObservation::new(start() + Duration::days(6), 0.0),
        RawObservation::new(start() + Duration::days(7), 0.005),
    ];

    let series = sanitize_returns(&raw).unwrap();
    assert_eq!(series.values(), &[0.01, 0.02, -0.01, 0.0, 0.005]);
}

#[test]
fn test_garbage_text_is_a_data_quality_error() {
    let mut raw: Vec<RawObservation> = (0..6)
        .map(|i| RawObservation::new(start() + Duration::days(i), 0.01))
        .collect();
    raw.push(RawObservation::new(
        start() + Duration::days(6),
        RawValue::Text("twelve".to_string()),
    ));

    assert_eq!(sanitize_returns(&raw).unwrap_err().kind(), ErrorKind::DataQuality);
}
