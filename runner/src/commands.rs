//! Command workflows: load → cycle → display → persist.

use std::path::Path;

use chrono::NaiveDate;
use log::info;
use nanofolio::{CycleReport, RunRecord, run_cycle};

use crate::backfill::{self, BackfillSummary};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::ResultsLog;
use crate::prices::{self, PriceFile};

/// Options for a backfill.
pub struct BackfillOptions {
    pub days: usize,
    /// Skip the confirmation prompt (for automation/cron).
    pub yes: bool,
}

/// One cycle as of `as_of` (default: the latest price date); appends the
/// record and returns it.
pub fn run(config: &Config, prices_path: &Path, as_of: Option<NaiveDate>) -> Result<RunRecord> {
    let file = PriceFile::load(prices_path)?;
    let history = file.history(&config.portfolio.tickers)?;
    let as_of = match as_of {
        Some(d) => d,
        None => prices::latest_date(&history)
            .ok_or_else(|| Error::Prices("price file has no observations".into()))?,
    };

    let window = prices::window_history(&history, as_of, config.portfolio.lookback_days);
    let report = run_cycle(
        as_of,
        &window,
        &config.cycle()?,
        config.portfolio.on_failure,
    )?;
    display_report(&report);

    let record = report.record();
    let path = config.results_path();
    ResultsLog::open(&path)?.append(&record)?;
    info!("Appended result for {as_of} to {}", path.display());
    Ok(record)
}

/// Re-run the last `opts.days` weekdays and append their records oldest first.
pub fn backfill(config: &Config, prices_path: &Path, opts: &BackfillOptions) -> Result<BackfillSummary> {
    let file = PriceFile::load(prices_path)?;
    let history = file.history(&config.portfolio.tickers)?;
    let latest = prices::latest_date(&history)
        .ok_or_else(|| Error::Prices("price file has no observations".into()))?;

    let dates = backfill::backfill_dates(latest, opts.days);
    let (Some(first), Some(last)) = (dates.first(), dates.last()) else {
        println!("Nothing to backfill.");
        return Ok(BackfillSummary::default());
    };
    println!(
        "Backfill {} runs from {first} to {last} ({} tickers, {} day lookback)",
        dates.len(),
        config.portfolio.tickers.len(),
        config.portfolio.lookback_days,
    );

    if !opts.yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Proceed?")
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;
        if !confirmed {
            return Err(Error::Aborted("backfill declined".into()));
        }
    }

    let outcomes = backfill::run_backfill(
        &history,
        &dates,
        &config.cycle()?,
        config.portfolio.lookback_days,
        config.portfolio.on_failure,
    );

    let mut log = ResultsLog::open(&config.results_path())?;
    let summary = backfill::write_outcomes(&outcomes, &mut log)?;

    println!("\nBACKFILL SUMMARY:");
    for outcome in &outcomes {
        match &outcome.result {
            Ok(_) => println!("  {}  ok", outcome.date),
            Err(e) => println!("  {}  FAILED  {e}", outcome.date),
        }
    }
    println!(
        "\n{} of {} runs succeeded, {} failed",
        summary.succeeded,
        summary.total(),
        summary.failed
    );
    Ok(summary)
}

/// Validate the price file against the config without running anything.
pub fn check(config: &Config, prices_path: Option<&Path>) -> Result<()> {
    println!(
        "Config OK: {} tickers, bounds [{:.2}, {:.2}], risk aversion {}",
        config.portfolio.tickers.len(),
        config.optimization.minimum_allocation,
        config.optimization.maximum_allocation,
        config.optimization.risk_aversion,
    );

    let Some(path) = prices_path else {
        return Ok(());
    };
    let history = PriceFile::load(path)?.history(&config.portfolio.tickers)?;
    for (ticker, series) in &history {
        println!(
            "  {:16} {:>5} rows  {} .. {}",
            ticker.as_str(),
            series.len(),
            series.first_date(),
            series.last_date()
        );
    }
    Ok(())
}

fn display_report(report: &CycleReport) {
    println!("\nALLOCATION as of {}:", report.as_of);
    println!(
        "  {:16} {:>12} {:>12} {:>9} {:>8}",
        "Ticker", "Current", "Predicted", "Return", "Weight"
    );
    for entry in report.record().entries {
        println!(
            "  {:16} {:>12.2} {:>12.2} {:>8.2}% {:>7.2}%",
            entry.ticker.as_str(),
            entry.current_price,
            entry.predicted_price,
            entry.predicted_return * 100.0,
            entry.weight * 100.0,
        );
    }
    for (ticker, err) in &report.failures {
        println!("  {:16} skipped: {err}", ticker.as_str());
    }

    let alloc = &report.allocation;
    println!(
        "\nExpected return {:.4}%, volatility {:.4}%",
        alloc.expected_return * 100.0,
        alloc.variance.max(0.0).sqrt() * 100.0
    );
}
