//! One forecast-then-allocate cycle.
//!
//! ```text
//! history ──► forecast_batch ──► append_predictions ──► covariance ──► allocate
//!                  │                                                     ▲
//!                  └────────────── predicted returns (μ) ────────────────┘
//! ```
//!
//! A cycle is stateless: every call re-fits every forecaster and re-solves the
//! allocation. Independent cycles (e.g. a backfill over many dates) can run
//! concurrently since nothing is shared between them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{info, warn};

use crate::allocate::{self, Allocation, AllocationConfig};
use crate::calendar::HolidayCalendar;
use crate::error::{Error, Result};
use crate::forecast::{self, Forecast, ForecastConfig};
use crate::record::{RecordEntry, RunRecord};
use crate::returns::{self, CovarianceMatrix};
use crate::series::{PriceSeries, Ticker};

/// Everything a cycle needs besides the data.
#[derive(Clone, Debug, Default)]
pub struct CycleConfig {
    pub forecast: ForecastConfig,
    pub allocation: AllocationConfig,
    pub calendar: HolidayCalendar,
}

impl CycleConfig {
    /// Validate for a basket of `n` instruments.
    pub fn validate(&self, n: usize) -> Result<()> {
        self.forecast.validate()?;
        self.allocation.validate(n)
    }
}

/// What to do when some instruments fail to forecast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FailurePolicy {
    /// Stop at the first failure (in ticker order).
    #[default]
    Abort,
    /// Allocate across the instruments that did forecast.
    Skip,
}

/// Result of a successful cycle.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub as_of: NaiveDate,
    pub forecasts: BTreeMap<Ticker, Forecast>,
    /// Instruments left out under [`FailurePolicy::Skip`].
    pub failures: BTreeMap<Ticker, Error>,
    pub covariance: CovarianceMatrix,
    pub allocation: Allocation,
}

impl CycleReport {
    /// The write-once record handed to persistence.
    pub fn record(&self) -> RunRecord {
        let entries = self
            .allocation
            .weights_by_ticker()
            .into_iter()
            .filter_map(|(ticker, weight)| {
                let f = self.forecasts.get(&ticker)?;
                Some(RecordEntry {
                    current_price: f.last_price,
                    predicted_price: f.predicted_price,
                    predicted_return: f.predicted_return,
                    ticker,
                    weight,
                })
            })
            .collect();

        RunRecord {
            date: self.as_of,
            entries,
        }
    }
}

/// Forecast every instrument in `history`, then allocate.
///
/// Configuration errors are raised before any fitting.
pub fn run_cycle(
    as_of: NaiveDate,
    history: &BTreeMap<Ticker, PriceSeries>,
    config: &CycleConfig,
    policy: FailurePolicy,
) -> Result<CycleReport> {
    config.validate(history.len())?;
    info!("Starting cycle for {} instruments as of {as_of}", history.len());

    let batch = forecast::forecast_batch(history, &config.calendar, &config.forecast)?;

    if let Some((ticker, err)) = batch.failures.iter().next() {
        match policy {
            FailurePolicy::Abort => return Err(err.clone()),
            FailurePolicy::Skip if batch.forecasts.is_empty() => {
                warn!("All {} instruments failed to forecast", batch.failures.len());
                return Err(err.clone());
            }
            FailurePolicy::Skip => warn!(
                "Skipping {} failed instruments (first: {ticker}: {err})",
                batch.failures.len()
            ),
        }
    }

    let scope = format!("cycle {as_of}");
    let extended = returns::append_predictions(history, &batch.forecasts)?;
    let covariance = returns::covariance(&extended).map_err(|e| e.within(&scope))?;
    let allocation = allocate::allocate(&batch.predicted_returns(), &covariance, &config.allocation)
        .map_err(|e| e.within(&scope))?;

    for (ticker, weight) in allocation.tickers.iter().zip(&allocation.weights) {
        info!("{ticker}: weight {:.2}%", weight * 100.0);
    }

    Ok(CycleReport {
        as_of,
        forecasts: batch.forecasts,
        failures: batch.failures,
        covariance,
        allocation,
    })
}
