//! TOML configuration loading and validation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use nanofolio::{
    AllocationConfig, CycleConfig, FailurePolicy, ForecastConfig, Holiday, HolidayCalendar, Ticker,
};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub optimization: OptimizationConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    pub tickers: Vec<Ticker>,
    /// Calendar days of history fed to each cycle.
    #[serde(default = "default_lookback")]
    pub lookback_days: u32,
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn default_lookback() -> u32 {
    730
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizationConfig {
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion: f64,
    #[serde(default = "default_min_allocation")]
    pub minimum_allocation: f64,
    #[serde(default = "default_max_allocation")]
    pub maximum_allocation: f64,
    #[serde(default)]
    pub allow_short: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_risk_aversion() -> f64 {
    3.0
}
fn default_min_allocation() -> f64 {
    0.05
}
fn default_max_allocation() -> f64 {
    0.30
}
fn default_max_iterations() -> usize {
    20_000
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            risk_aversion: default_risk_aversion(),
            minimum_allocation: default_min_allocation(),
            maximum_allocation: default_max_allocation(),
            allow_short: false,
            max_iterations: default_max_iterations(),
        }
    }
}

impl OptimizationConfig {
    pub fn allocation(&self) -> AllocationConfig {
        AllocationConfig {
            risk_aversion: self.risk_aversion,
            minimum_allocation: self.minimum_allocation,
            maximum_allocation: self.maximum_allocation,
            allow_short: self.allow_short,
            max_iterations: self.max_iterations,
            ..AllocationConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Nse,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_market")]
    pub market: Market,
    #[serde(default)]
    pub extra_holidays: Vec<ExtraHoliday>,
}

fn default_market() -> Market {
    Market::Nse
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            market: default_market(),
            extra_holidays: Vec::new(),
        }
    }
}

/// A holiday declared in the config on top of the market table.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraHoliday {
    pub date: NaiveDate,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lower_window: u32,
    #[serde(default)]
    pub upper_window: u32,
}

impl CalendarConfig {
    pub fn build(&self) -> Result<HolidayCalendar> {
        let base = match self.market {
            Market::Nse => HolidayCalendar::nse(),
            Market::None => HolidayCalendar::empty(),
        };
        let extra = self
            .extra_holidays
            .iter()
            .map(|h| Holiday {
                date: h.date,
                name: h.name.clone(),
                lower_window: h.lower_window,
                upper_window: h.upper_window,
            })
            .collect();
        Ok(base.extend(extra)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    #[serde(default = "default_output_file")]
    pub file: String,
}

fn default_output_dir() -> String {
    "./results".into()
}
fn default_output_file() -> String {
    "portfolio_allocations.jsonl".into()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            file: default_output_file(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        let tickers = &self.portfolio.tickers;
        if tickers.is_empty() {
            return Err(Error::Config("portfolio.tickers must not be empty".into()));
        }
        let mut seen = BTreeSet::new();
        for t in tickers {
            if t.as_str().is_empty() {
                return Err(Error::Config("empty ticker".into()));
            }
            if !seen.insert(t) {
                return Err(Error::Config(format!("duplicate ticker: {t}")));
            }
        }
        if self.portfolio.lookback_days < 2 {
            return Err(Error::Config("lookback_days must be >= 2".into()));
        }
        if self.optimization.max_iterations == 0 {
            return Err(Error::Config("max_iterations must be > 0".into()));
        }
        if self.output.file.is_empty() {
            return Err(Error::Config("output.file must not be empty".into()));
        }
        self.cycle()?.validate(tickers.len())?;
        Ok(())
    }

    /// Core settings for one cycle.
    pub fn cycle(&self) -> Result<CycleConfig> {
        Ok(CycleConfig {
            forecast: self.forecast.clone(),
            allocation: self.optimization.allocation(),
            calendar: self.calendar.build()?,
        })
    }

    /// Full path to the results file.
    pub fn results_path(&self) -> PathBuf {
        Path::new(&self.output.dir).join(&self.output.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[portfolio]
tickers = ["HINDUNILVR.NS", "TCS.NS", "INFY.NS", "ITC.NS", "SBIN.NS"]
lookback_days = 730

[optimization]
risk_aversion = 3.0
minimum_allocation = 0.05
maximum_allocation = 0.30
allow_short = false

[forecast]
changepoint_prior_scale = 0.05
daily_seasonality = true

[calendar]
market = "nse"
extra_holidays = [{ date = "2025-12-31", name = "Year end" }]

[output]
dir = "./results"
file = "portfolio_allocations.jsonl"
"#
    }

    #[test]
    fn parse_example_config() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.portfolio.tickers.len(), 5);
        assert_eq!(config.portfolio.tickers[0], Ticker::new("HINDUNILVR.NS"));
        assert_eq!(config.portfolio.on_failure, FailurePolicy::Abort);
        assert_eq!(config.optimization.risk_aversion, 3.0);
        assert_eq!(config.forecast.n_changepoints, 25);
        assert_eq!(config.calendar.market, Market::Nse);

        let calendar = config.calendar.build().unwrap();
        assert_eq!(calendar.len(), HolidayCalendar::nse().len() + 1);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml(
            "[portfolio]\ntickers = [\"A\", \"B\", \"C\", \"D\"]\non_failure = \"skip\"\n",
        )
        .unwrap();
        assert_eq!(config.portfolio.lookback_days, 730);
        assert_eq!(config.portfolio.on_failure, FailurePolicy::Skip);
        assert_eq!(config.optimization.minimum_allocation, 0.05);
        assert_eq!(config.optimization.maximum_allocation, 0.30);
        assert!(!config.optimization.allow_short);
        assert_eq!(
            config.results_path(),
            PathBuf::from("./results/portfolio_allocations.jsonl")
        );
    }

    #[test]
    fn validate_catches_empty_tickers() {
        let err = Config::from_toml("[portfolio]\ntickers = []\n").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn validate_catches_duplicate_tickers() {
        let err = Config::from_toml("[portfolio]\ntickers = [\"A\", \"A\", \"B\", \"C\"]\n")
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn validate_catches_infeasible_minimum() {
        let toml = example_toml().replace("minimum_allocation = 0.05", "minimum_allocation = 0.25");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("minimum allocation"));
    }

    #[test]
    fn validate_catches_bad_bounds() {
        let toml = example_toml().replace("maximum_allocation = 0.30", "maximum_allocation = 0.01");
        assert!(Config::from_toml(&toml).unwrap_err().is_config());
    }

    #[test]
    fn validate_catches_bad_forecast_params() {
        let toml = example_toml().replace(
            "changepoint_prior_scale = 0.05",
            "changepoint_prior_scale = -1.0",
        );
        assert!(Config::from_toml(&toml).unwrap_err().is_config());
    }

    #[test]
    fn duplicate_extra_holiday_is_rejected() {
        // Christmas is already in the NSE table.
        let toml = example_toml().replace("2025-12-31", "2025-12-25");
        assert!(Config::from_toml(&toml).unwrap_err().is_config());
    }

    #[test]
    fn market_none_starts_empty() {
        let toml = example_toml().replace("market = \"nse\"", "market = \"none\"");
        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(config.calendar.build().unwrap().len(), 1);
    }

    #[test]
    fn short_config_maps_through() {
        let toml = example_toml().replace("allow_short = false", "allow_short = true");
        let config = Config::from_toml(&toml).unwrap();
        assert!(config.cycle().unwrap().allocation.allow_short);
    }
}
