//! Historical backfill: one independent cycle per past as-of date.
//!
//! Each date sees only the history window ending on that date, so runs share
//! nothing and are spread over the rayon pool. Outcomes come back in date
//! order and are written oldest first.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use log::{info, warn};
use nanofolio::{CycleConfig, CycleReport, FailurePolicy, PriceSeries, Ticker, run_cycle};
use rayon::prelude::*;

use crate::error::Result;
use crate::output::ResultsLog;
use crate::prices::window_history;

/// The last `days` weekdays up to and including `latest`, oldest first.
pub fn backfill_dates(latest: NaiveDate, days: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(days);
    let mut day = Some(latest);
    while let Some(d) = day {
        if dates.len() == days {
            break;
        }
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(d);
        }
        day = d.pred_opt();
    }
    dates.reverse();
    dates
}

/// Result of the cycle for one as-of date.
#[derive(Debug)]
pub struct BackfillOutcome {
    pub date: NaiveDate,
    pub result: nanofolio::Result<CycleReport>,
}

/// Run one cycle per date on the windowed history.
pub fn run_backfill(
    history: &BTreeMap<Ticker, PriceSeries>,
    dates: &[NaiveDate],
    config: &CycleConfig,
    lookback_days: u32,
    policy: FailurePolicy,
) -> Vec<BackfillOutcome> {
    dates
        .par_iter()
        .map(|&date| {
            let window = window_history(history, date, lookback_days);
            let result = run_cycle(date, &window, config, policy);
            if let Err(e) = &result {
                warn!("{date}: backfill run failed: {e}");
            }
            BackfillOutcome { date, result }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BackfillSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Append every successful outcome in date order and tally the rest.
pub fn write_outcomes(outcomes: &[BackfillOutcome], log: &mut ResultsLog) -> Result<BackfillSummary> {
    let mut summary = BackfillSummary::default();
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                log.append(&report.record())?;
                summary.succeeded += 1;
            }
            Err(_) => summary.failed += 1,
        }
    }
    info!(
        "Backfill finished: {} succeeded, {} failed",
        summary.succeeded, summary.failed
    );
    Ok(summary)
}
