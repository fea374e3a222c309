//! Benchmarks for the walk-forward backtester and the risk metrics.
//!
//! Run with: cargo bench -p forecast_risk

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use forecast_risk::risk::{conditional_value_at_risk, max_drawdown, value_at_risk};
use forecast_risk::{ReturnSeries, WalkForwardBacktester};

/// Deterministic synthetic daily returns
fn generate_returns(count: usize) -> ReturnSeries {
    let values: Vec<f64> = (0..count)
        .map(|i| 0.0005 + 0.01 * ((i as f64 * 0.7).sin() + 0.5 * (i as f64 * 1.3).cos()))
        .collect();
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    ReturnSeries::daily(start, values).expect("synthetic returns are finite")
}

fn bench_walk_forward(c: &mut Criterion) {
    let backtester = WalkForwardBacktester::default();
    let mut group = c.benchmark_group("walk_forward");

    for len in [100usize, 500, 2500].iter() {
        let series = generate_returns(*len);
        group.bench_with_input(BenchmarkId::new("baselines", len), &series, |b, series| {
            b.iter(|| backtester.run(black_box(series), None))
        });
    }

    group.finish();
}

fn bench_risk_metrics(c: &mut Criterion) {
    let series = generate_returns(2500);
    let returns = series.values();

    let mut group = c.benchmark_group("risk");
    group.bench_function("var_95", |b| b.iter(|| value_at_risk(black_box(returns), 10_000.0, 0.95)));
    group.bench_function("cvar_95", |b| {
        b.iter(|| conditional_value_at_risk(black_box(returns), 10_000.0, 0.95))
    });
    group.bench_function("max_drawdown", |b| b.iter(|| max_drawdown(black_box(returns))));
    group.finish();
}

criterion_group!(benches, bench_walk_forward, bench_risk_metrics);
criterion_main!(benches);
