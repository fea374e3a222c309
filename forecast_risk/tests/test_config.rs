use forecast_risk::config::ArimaOrder;
use forecast_risk::{EngineConfig, ForecastError, StrategyKind};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
forecast_days = 14
confidence_level = 0.99
enabled_strategies = ["arima", "linear_trend"]
parallel_securities = false

[arima]
orders = [{{ p = 1, d = 1, q = 0 }}]

[logging]
level = "debug"
"#
    )
    .unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.forecast_days, 14);
    assert_eq!(config.confidence_level, 0.99);
    assert_eq!(
        config.enabled_strategies,
        vec![StrategyKind::Arima, StrategyKind::LinearTrend]
    );
    assert_eq!(config.arima.orders, vec![ArimaOrder::new(1, 1, 0)]);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.random_forest.n_trees, 100);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ForecastError::Io(_)));
}

#[test]
fn test_round_trip_through_toml() {
    let original = EngineConfig {
        forecast_days: 60,
        cache_capacity: 8,
        ..EngineConfig::default()
    };
    let text = original.to_toml_string().unwrap();
    assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), original);
}

#[test]
fn test_malformed_toml_is_config_error() {
    let err = EngineConfig::from_toml_str("forecast_days = [").unwrap_err();
    assert!(matches!(err, ForecastError::Config(_)));
}
