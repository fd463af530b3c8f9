//! Return and covariance estimation.
//!
//! The expected-return vector handed to the allocator comes from the
//! forecaster, while risk comes from the history. To keep both on one date
//! basis, [`append_predictions`] first extends every series with its
//! predicted price at the forecast date, and [`covariance`] is estimated on
//! those extended series. The last return of every instrument is therefore
//! its predicted return.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::forecast::Forecast;
use crate::series::{PriceSeries, Ticker};

/// Extend each series with its forecast as if it had been realized.
///
/// Tickers without a forecast are left out of the result. The input history
/// is not modified.
pub fn append_predictions(
    history: &BTreeMap<Ticker, PriceSeries>,
    forecasts: &BTreeMap<Ticker, Forecast>,
) -> Result<BTreeMap<Ticker, PriceSeries>> {
    let mut out = BTreeMap::new();
    for (ticker, series) in history {
        let Some(f) = forecasts.get(ticker) else {
            continue;
        };
        let extended = series.with_appended(ticker, f.next_date, f.predicted_price)?;
        out.insert(ticker.clone(), extended);
    }
    Ok(out)
}

/// Square covariance matrix with its instrument ordering.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CovarianceMatrix {
    tickers: Vec<Ticker>,
    values: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    /// Wrap a precomputed matrix. Must be square, symmetric, finite and
    /// match `tickers` in size.
    pub fn new(tickers: Vec<Ticker>, values: Vec<Vec<f64>>) -> Result<Self> {
        let n = tickers.len();
        if values.len() != n || values.iter().any(|row| row.len() != n) {
            return Err(Error::Config(format!(
                "covariance matrix must be {n}x{n}"
            )));
        }
        for i in 0..n {
            for j in 0..n {
                let v = values[i][j];
                if !v.is_finite() {
                    return Err(Error::numerical(
                        "covariance",
                        format!("non-finite entry for ({}, {})", tickers[i], tickers[j]),
                    ));
                }
                if (v - values[j][i]).abs() > 1e-12 * (1.0 + v.abs()) {
                    return Err(Error::Config(format!(
                        "covariance matrix is not symmetric at ({}, {})",
                        tickers[i], tickers[j]
                    )));
                }
            }
        }
        Ok(Self { tickers, values })
    }

    pub fn dim(&self) -> usize {
        self.tickers.len()
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    pub fn variance(&self, ticker: &Ticker) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == ticker)?;
        Some(self.values[i][i])
    }
}

/// Pairwise-complete sample covariance (ddof 1) of daily simple returns.
///
/// Returns are aligned by date. Each pair `(i, j)` uses only the dates on
/// which both instruments have a return, with means taken over that shared
/// subset, so a missing day for one instrument does not drop the day for
/// the others. Fails if a pair shares fewer than two return dates.
///
/// The result may be indefinite when histories differ in length; the
/// allocator repairs that before solving.
pub fn covariance(series: &BTreeMap<Ticker, PriceSeries>) -> Result<CovarianceMatrix> {
    let tickers: Vec<Ticker> = series.keys().cloned().collect();
    let returns: Vec<BTreeMap<NaiveDate, f64>> = series
        .values()
        .map(|s| s.simple_returns().into_iter().collect())
        .collect();

    let n = tickers.len();
    let mut values = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in i..n {
            let pairs: Vec<(f64, f64)> = returns[i]
                .iter()
                .filter_map(|(date, ri)| returns[j].get(date).map(|rj| (*ri, *rj)))
                .collect();

            if pairs.len() < 2 {
                return Err(Error::numerical(
                    "covariance",
                    format!(
                        "{} and {} share {} return dates, need at least 2",
                        tickers[i],
                        tickers[j],
                        pairs.len()
                    ),
                ));
            }

            let v = pair_covariance(&pairs);
            if !v.is_finite() {
                return Err(Error::numerical(
                    "covariance",
                    format!("non-finite covariance for ({}, {})", tickers[i], tickers[j]),
                ));
            }
            values[i][j] = v;
            values[j][i] = v;
        }
    }

    Ok(CovarianceMatrix { tickers, values })
}

fn pair_covariance(pairs: &[(f64, f64)]) -> f64 {
    let count = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / count;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / count;

    let ss = pairs
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum::<f64>();

    ss / (count - 1.0)
}
