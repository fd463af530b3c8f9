//! Price file (prices.json) loading.
//!
//! The file maps each ticker to its daily closes:
//!
//! ```json
//! {
//!   "TCS.NS": [
//!     { "date": "2025-01-02", "price": 4102.35 },
//!     { "date": "2025-01-03", "price": 4087.10 }
//!   ]
//! }
//! ```
//!
//! Rows may come in any order; they are sorted by date before validation.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use log::warn;
use nanofolio::{PriceSeries, Ticker};
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub price: f64,
}

/// Raw contents of a price file, keyed by ticker.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct PriceFile {
    pub series: BTreeMap<Ticker, Vec<PriceRow>>,
}

impl PriceFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::PricesRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validated series for `tickers`, in ticker order.
    ///
    /// Every requested ticker must be present; extra tickers in the file are
    /// ignored.
    pub fn history(&self, tickers: &[Ticker]) -> Result<BTreeMap<Ticker, PriceSeries>> {
        let mut out = BTreeMap::new();
        for ticker in tickers {
            let rows = self
                .series
                .get(ticker)
                .ok_or_else(|| Error::Prices(format!("no prices for {ticker}")))?;
            let mut obs: Vec<(NaiveDate, f64)> = rows.iter().map(|r| (r.date, r.price)).collect();
            obs.sort_by_key(|o| o.0);
            out.insert(ticker.clone(), PriceSeries::new(ticker, obs)?);
        }
        Ok(out)
    }
}

/// History restricted to the inclusive window `[as_of - lookback_days, as_of]`.
///
/// Tickers with no observation inside the window are dropped with a warning.
pub fn window_history(
    history: &BTreeMap<Ticker, PriceSeries>,
    as_of: NaiveDate,
    lookback_days: u32,
) -> BTreeMap<Ticker, PriceSeries> {
    let start = as_of - Duration::days(i64::from(lookback_days));
    let mut out = BTreeMap::new();
    for (ticker, series) in history {
        match series.window(start, as_of) {
            Some(w) => {
                out.insert(ticker.clone(), w);
            }
            None => warn!("{ticker}: no prices between {start} and {as_of}"),
        }
    }
    out
}

/// Latest observation date across all series.
pub fn latest_date(history: &BTreeMap<Ticker, PriceSeries>) -> Option<NaiveDate> {
    history.values().map(|s| s.last_date()).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "TCS.NS": [
                { "date": "2025-01-03", "price": 4087.10 },
                { "date": "2025-01-02", "price": 4102.35 }
            ],
            "ITC.NS": [
                { "date": "2025-01-02", "price": 480.0 },
                { "date": "2025-01-06", "price": 482.5 }
            ],
            "UNUSED": [
                { "date": "2025-01-02", "price": 1.0 }
            ]
        }"#
    }

    #[test]
    fn history_sorts_and_selects() {
        let file = PriceFile::from_json(sample()).unwrap();
        let tickers = vec![Ticker::new("TCS.NS"), Ticker::new("ITC.NS")];
        let history = file.history(&tickers).unwrap();

        assert_eq!(history.len(), 2);
        let tcs = &history[&Ticker::new("TCS.NS")];
        assert_eq!(tcs.first_date(), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(tcs.last_price(), 4087.10);
        assert_eq!(
            latest_date(&history),
            NaiveDate::from_ymd_opt(2025, 1, 6)
        );
    }

    #[test]
    fn window_is_inclusive_and_drops_empty_series() {
        let file = PriceFile::from_json(sample()).unwrap();
        let tickers = vec![Ticker::new("TCS.NS"), Ticker::new("ITC.NS")];
        let history = file.history(&tickers).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();

        let w = window_history(&history, as_of, 3);
        assert_eq!(w.len(), 2);
        assert_eq!(w[&Ticker::new("TCS.NS")].len(), 1);
        assert_eq!(w[&Ticker::new("ITC.NS")].last_date(), as_of);

        let w = window_history(&history, as_of, 0);
        assert_eq!(w.len(), 1);
        assert!(w.contains_key(&Ticker::new("ITC.NS")));
    }

    #[test]
    fn missing_ticker_is_an_error() {
        let file = PriceFile::from_json(sample()).unwrap();
        let err = file.history(&[Ticker::new("SBIN.NS")]).unwrap_err();
        assert!(matches!(err, Error::Prices(_)));
    }

    #[test]
    fn invalid_rows_surface_core_error() {
        let json = r#"{ "X": [
            { "date": "2025-01-02", "price": 10.0 },
            { "date": "2025-01-02", "price": 11.0 }
        ] }"#;
        let file = PriceFile::from_json(json).unwrap();
        let err = file.history(&[Ticker::new("X")]).unwrap_err();
        assert!(matches!(
            err,
            Error::Core(nanofolio::Error::InvalidSeries { .. })
        ));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            PriceFile::from_json("{ not json").unwrap_err(),
            Error::PricesParse(_)
        ));
    }
}
