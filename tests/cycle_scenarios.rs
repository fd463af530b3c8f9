//! End-to-end scenarios: forecast → append → covariance → allocate.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use nanofolio::{
    AllocationConfig, CovarianceMatrix, CycleConfig, Error, ErrorKind, FailurePolicy,
    ForecastConfig, HolidayCalendar, PriceSeries, Ticker, allocate, append_predictions,
    covariance, forecast_batch, forecast_next, run_cycle,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Weekday closes that skip the NSE holidays, `f(i)` per bar.
fn trading_series(name: &str, start: NaiveDate, days: i64, f: impl Fn(usize) -> f64) -> (Ticker, PriceSeries) {
    let calendar = HolidayCalendar::nse();
    let ticker = Ticker::new(name);
    let obs = (0..days)
        .map(|off| start + Duration::days(off))
        .filter(|d| calendar.is_trading_day(*d))
        .enumerate()
        .map(|(i, d)| (d, f(i)))
        .collect();
    let series = PriceSeries::new(&ticker, obs).unwrap();
    (ticker, series)
}

/// Deterministic xorshift walk around `base`.
fn walk(base: f64, drift: f64, seed: u32) -> impl Fn(usize) -> f64 {
    let mut state = seed.max(1);
    let mut shocks = Vec::with_capacity(800);
    for _ in 0..800 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        shocks.push((state % 401) as f64 / 10_000.0 - 0.02);
    }
    move |i| {
        let level: f64 = shocks[..=i.min(799)].iter().sum();
        base * (1.0 + drift * i as f64 + 0.5 * level).max(0.2)
    }
}

fn nse_basket() -> BTreeMap<Ticker, PriceSeries> {
    let start = d(2024, 1, 1);
    BTreeMap::from([
        trading_series("HINDUNILVR.NS", start, 540, walk(2400.0, 0.0002, 11)),
        trading_series("INFY.NS", start, 540, walk(1500.0, 0.0004, 23)),
        trading_series("ITC.NS", start, 540, walk(430.0, 0.0001, 37)),
        trading_series("SBIN.NS", start, 540, walk(620.0, 0.0006, 41)),
        trading_series("TCS.NS", start, 540, walk(3600.0, 0.0003, 53)),
    ])
}

// ============================================================================
// Forecasting
// ============================================================================

#[test]
fn year_plus_history_gives_finite_positive_forecasts() {
    let history = nse_basket();
    let batch =
        forecast_batch(&history, &HolidayCalendar::nse(), &ForecastConfig::default()).unwrap();
    assert!(batch.is_complete());

    for (ticker, f) in &batch.forecasts {
        assert!(f.predicted_price.is_finite() && f.predicted_price > 0.0, "{ticker}");
        let recomputed = (f.predicted_price - f.last_price) / f.last_price;
        assert!((recomputed - f.predicted_return).abs() < 1e-12);
        assert_eq!(f.last_price, history[ticker].last_price());
    }
}

#[test]
fn batch_matches_single_forecasts() {
    let history = nse_basket();
    let calendar = HolidayCalendar::nse();
    let config = ForecastConfig::default();
    let batch = forecast_batch(&history, &calendar, &config).unwrap();
    for (ticker, series) in &history {
        let single = forecast_next(ticker, series, &calendar, &config).unwrap();
        assert_eq!(batch.forecasts[ticker], single);
    }
}

// ============================================================================
// Covariance on extended series
// ============================================================================

#[test]
fn covariance_includes_predicted_return() {
    let history = nse_basket();
    let batch =
        forecast_batch(&history, &HolidayCalendar::nse(), &ForecastConfig::default()).unwrap();
    let extended = append_predictions(&history, &batch.forecasts).unwrap();

    for (ticker, series) in &extended {
        assert_eq!(series.len(), history[ticker].len() + 1);
        assert_eq!(series.last_date(), batch.forecasts[ticker].next_date);
    }

    let with = covariance(&extended).unwrap();
    let without = covariance(&history).unwrap();
    assert_eq!(with.dim(), 5);
    assert_ne!(with, without);
}

// ============================================================================
// Allocation scenarios
// ============================================================================

#[test]
fn flat_market_splits_equally() {
    let start = d(2024, 3, 4);
    let history = BTreeMap::from([
        trading_series("A", start, 30, |_| 10.0),
        trading_series("B", start, 30, |_| 20.0),
        trading_series("C", start, 30, |_| 30.0),
    ]);
    let cov = covariance(&history).unwrap();
    assert!(cov.values().iter().flatten().all(|v| *v == 0.0));

    let mu: BTreeMap<Ticker, f64> = history.keys().map(|t| (t.clone(), 0.001)).collect();
    let config = AllocationConfig {
        minimum_allocation: 0.0,
        maximum_allocation: 1.0,
        ..Default::default()
    };
    let alloc = allocate(&mu, &cov, &config).unwrap();
    for w in &alloc.weights {
        assert!((w - 1.0 / 3.0).abs() < 1e-9, "{:?}", alloc.weights);
    }
}

#[test]
fn single_instrument_takes_everything() {
    let t = Ticker::new("RELIANCE.NS");
    let cov = CovarianceMatrix::new(vec![t.clone()], vec![vec![0.0004]]).unwrap();
    let alloc = allocate(
        &BTreeMap::from([(t.clone(), 0.002)]),
        &cov,
        &AllocationConfig::default(),
    )
    .unwrap();
    assert_eq!(alloc.weight(&t), Some(1.0));
    assert!(alloc.bounds_relaxed);
}

#[test]
fn ten_instruments_with_fifteen_percent_floor_is_config_error() {
    let tickers: Vec<Ticker> = (0..10).map(|i| Ticker::new(format!("S{i:02}"))).collect();
    let values = (0..10)
        .map(|i| (0..10).map(|j| if i == j { 1e-4 } else { 0.0 }).collect())
        .collect();
    let cov = CovarianceMatrix::new(tickers.clone(), values).unwrap();
    let mu = tickers.iter().map(|t| (t.clone(), 0.0)).collect();
    let config = AllocationConfig {
        minimum_allocation: 0.15,
        maximum_allocation: 0.5,
        ..Default::default()
    };

    let err = allocate(&mu, &cov, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(!err.is_retryable());
}

#[test]
fn exhausted_iterations_are_retryable() {
    let tickers = vec![Ticker::new("A"), Ticker::new("B"), Ticker::new("C")];
    let cov = CovarianceMatrix::new(
        tickers.clone(),
        vec![
            vec![0.04, 0.006, 0.004],
            vec![0.006, 0.09, 0.01],
            vec![0.004, 0.01, 0.02],
        ],
    )
    .unwrap();
    let mu = BTreeMap::from([
        (tickers[0].clone(), 0.05),
        (tickers[1].clone(), 0.0),
        (tickers[2].clone(), -0.02),
    ]);
    let config = AllocationConfig {
        minimum_allocation: 0.1,
        maximum_allocation: 0.6,
        max_iterations: 1,
        ..Default::default()
    };

    let err = allocate(&mu, &cov, &config).unwrap_err();
    assert!(matches!(err, Error::NotConverged { iterations: 1, .. }));
    assert!(err.is_retryable());
    assert_eq!(err.kind(), ErrorKind::Numerical);
}

// ============================================================================
// Full cycle
// ============================================================================

#[test]
fn nse_cycle_respects_default_bounds() {
    let history = nse_basket();
    let config = CycleConfig {
        calendar: HolidayCalendar::nse(),
        ..Default::default()
    };
    let as_of = history.values().map(|s| s.last_date()).max().unwrap();
    let report = run_cycle(as_of, &history, &config, FailurePolicy::Abort).unwrap();

    let record = report.record();
    assert_eq!(record.entries.len(), 5);
    assert!((record.total_weight() - 1.0).abs() < 1e-6);
    for e in &record.entries {
        assert!(e.weight >= 0.05 - 1e-6 && e.weight <= 0.30 + 1e-6, "{e:?}");
        assert!(e.predicted_price > 0.0);
    }
    assert!(!report.allocation.bounds_relaxed);
}

#[test]
fn input_history_is_never_modified() {
    let history = nse_basket();
    let before = history.clone();
    let config = CycleConfig::default();
    let as_of = d(2025, 6, 20);
    run_cycle(as_of, &history, &config, FailurePolicy::Abort).unwrap();
    assert_eq!(history, before);
}

#[test]
fn short_history_is_reported_per_instrument() {
    let mut history = nse_basket();
    let (t, s) = trading_series("NEW.NS", d(2025, 6, 10), 1, |_| 100.0);
    history.insert(t.clone(), s);

    let config = CycleConfig {
        allocation: AllocationConfig {
            maximum_allocation: 0.5,
            ..Default::default()
        },
        ..Default::default()
    };
    let err = run_cycle(d(2025, 6, 20), &history, &config, FailurePolicy::Abort).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);
    assert_eq!(err.ticker(), Some(&t));

    let report = run_cycle(d(2025, 6, 20), &history, &config, FailurePolicy::Skip).unwrap();
    assert_eq!(report.forecasts.len(), 5);
    assert_eq!(report.failures.len(), 1);
}
