//! CLI entry point for the nanofolio runner.

use std::path::PathBuf;
use std::process;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use nanofolio_runner::commands::{self, BackfillOptions};
use nanofolio_runner::config::Config;
use nanofolio_runner::error::Error;

#[derive(Parser)]
#[command(name = "nanofolio")]
#[command(about = "Next-day forecasts and mean-variance allocation for a stock basket")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Forecast, allocate and append one result record
    Run {
        /// Path to prices.json
        #[arg(long)]
        prices: PathBuf,

        /// As-of date (YYYY-MM-DD); defaults to the latest price date
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Re-run the last N weekdays, oldest first
    Backfill {
        /// Path to prices.json
        #[arg(long)]
        prices: PathBuf,

        /// Number of weekdays to re-run
        #[arg(long)]
        days: usize,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        yes: bool,
    },

    /// Validate config and, optionally, a price file
    Check {
        /// Path to prices.json
        #[arg(long)]
        prices: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(2);
        }
    };

    let result = match cli.command {
        Command::Run { prices, as_of } => commands::run(&config, &prices, as_of).map(|_| ()),
        Command::Backfill { prices, days, yes } => {
            let opts = BackfillOptions { days, yes };
            commands::backfill(&config, &prices, &opts).map(|_| ())
        }
        Command::Check { prices } => commands::check(&config, prices.as_deref()),
    };

    if let Err(e) = result {
        match &e {
            Error::Aborted(msg) => {
                eprintln!("Aborted: {msg}");
                process::exit(0);
            }
            e if e.is_config() => {
                eprintln!("Configuration error: {e}");
                process::exit(2);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
