//! # nanofolio
//!
//! Next-day price forecasting and constrained mean-variance allocation for a
//! basket of daily-priced instruments.
//!
//! ## Features
//!
//! - **Forecasting**: additive trend + seasonality + holiday model, refitted per run
//! - **Risk**: pairwise-complete covariance of date-aligned simple returns
//! - **Allocation**: long-only or short-allowed weights under per-asset bounds
//! - **Stateless cycles**: each as-of date is an independent computation
//!
//! ## Quick Start
//!
//! ```
//! use std::collections::BTreeMap;
//! use nanofolio::{allocate, AllocationConfig, CovarianceMatrix, Ticker};
//!
//! let tickers = vec![Ticker::new("INFY.NS"), Ticker::new("TCS.NS")];
//! let cov = CovarianceMatrix::new(
//!     tickers.clone(),
//!     vec![vec![0.04, 0.01], vec![0.01, 0.09]],
//! ).unwrap();
//! let expected = BTreeMap::from([
//!     (tickers[0].clone(), 0.002),
//!     (tickers[1].clone(), 0.001),
//! ]);
//!
//! let config = AllocationConfig {
//!     minimum_allocation: 0.1,
//!     maximum_allocation: 0.9,
//!     ..Default::default()
//! };
//! let alloc = allocate(&expected, &cov, &config).unwrap();
//!
//! assert!((alloc.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
//! assert!(alloc.weights[0] > alloc.weights[1]);
//! ```
//!
//! ## Full Cycle
//!
//! [`run_cycle`] chains the stages: forecast every series, extend each with
//! its predicted price, estimate the covariance, then allocate.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use chrono::NaiveDate;
//! use nanofolio::{run_cycle, CycleConfig, FailurePolicy, HolidayCalendar, PriceSeries, Ticker};
//!
//! # fn load() -> BTreeMap<Ticker, PriceSeries> { BTreeMap::new() }
//! let history = load();
//! let config = CycleConfig {
//!     calendar: HolidayCalendar::nse(),
//!     ..Default::default()
//! };
//! let as_of = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
//! let report = run_cycle(as_of, &history, &config, FailurePolicy::Abort)?;
//! for entry in report.record().entries {
//!     println!("{}: {:.2}%", entry.ticker, entry.weight * 100.0);
//! }
//! # Ok::<(), nanofolio::Error>(())
//! ```
//!
//! ## Errors
//!
//! | Kind | Raised for | Scope |
//! |------|------------|-------|
//! | **Configuration** | infeasible bounds, bad parameters | whole run |
//! | **InsufficientData** | too-short, constant or malformed series | one instrument |
//! | **Numerical** | non-finite values, solver failure | whole run |

pub mod allocate;
pub mod calendar;
pub mod cycle;
mod error;
pub mod forecast;
pub mod record;
pub mod returns;
pub mod series;

// Re-export public API
pub use allocate::{Allocation, AllocationConfig, allocate, optimize_mean_variance};
pub use calendar::{Holiday, HolidayCalendar};
pub use cycle::{CycleConfig, CycleReport, FailurePolicy, run_cycle};
pub use error::{Error, ErrorKind, Result};
pub use forecast::{BatchForecast, Forecast, ForecastConfig, forecast_batch, forecast_next};
pub use record::{RecordEntry, RunRecord};
pub use returns::{CovarianceMatrix, append_predictions, covariance};
pub use series::{PriceSeries, Ticker};
