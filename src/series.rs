//! Core types: Ticker and the validated daily PriceSeries.

use std::fmt;

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Instrument identifier, e.g. `RELIANCE.NS`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Ticker(String);

impl Ticker {
    pub fn new(s: impl Into<String>) -> Self {
        Ticker(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Ticker::new(s)
    }
}

/// A daily price history: strictly increasing dates, finite positive prices.
///
/// Gaps (weekends, holidays) are allowed; duplicates are not. The series is
/// immutable once built: [`PriceSeries::with_appended`] returns a new value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PriceSeries {
    dates: Vec<NaiveDate>,
    prices: Vec<f64>,
}

impl PriceSeries {
    /// Build a series from `(date, price)` observations.
    ///
    /// `ticker` is only used to label the error.
    pub fn new(ticker: &Ticker, observations: Vec<(NaiveDate, f64)>) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidSeries {
            ticker: ticker.clone(),
            reason,
        };

        if observations.is_empty() {
            return Err(invalid("series is empty".into()));
        }

        let mut dates = Vec::with_capacity(observations.len());
        let mut prices = Vec::with_capacity(observations.len());

        for (date, price) in observations {
            if let Some(prev) = dates.last() {
                if date == *prev {
                    return Err(invalid(format!("duplicate date {date}")));
                }
                if date < *prev {
                    return Err(invalid(format!("date {date} is out of order (after {prev})")));
                }
            }
            if !price.is_finite() || price <= 0.0 {
                return Err(invalid(format!("price {price} on {date} is not finite and positive")));
            }
            dates.push(date);
            prices.push(price);
        }

        Ok(Self { dates, prices })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Always false for a constructed series.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    pub fn last_price(&self) -> f64 {
        self.prices[self.prices.len() - 1]
    }

    /// Observations with `start <= date <= end`, or `None` if nothing falls
    /// in the span.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Option<Self> {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        if lo >= hi {
            return None;
        }
        Some(Self {
            dates: self.dates[lo..hi].to_vec(),
            prices: self.prices[lo..hi].to_vec(),
        })
    }

    /// A copy of this series with one more observation at the end.
    ///
    /// Fails if `date` does not come after the last observation or the price
    /// is not finite and positive.
    pub fn with_appended(&self, ticker: &Ticker, date: NaiveDate, price: f64) -> Result<Self> {
        let mut observations: Vec<(NaiveDate, f64)> = self
            .dates
            .iter()
            .copied()
            .zip(self.prices.iter().copied())
            .collect();
        observations.push((date, price));
        Self::new(ticker, observations)
    }

    /// Simple returns `p_t / p_{t-1} - 1`, stamped with the date of `p_t`.
    pub fn simple_returns(&self) -> Vec<(NaiveDate, f64)> {
        self.dates
            .windows(2)
            .zip(self.prices.windows(2))
            .map(|(d, p)| (d[1], p[1] / p[0] - 1.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn tk() -> Ticker {
        Ticker::new("ITC.NS")
    }

    #[test]
    fn rejects_duplicates_and_disorder() {
        let dup = PriceSeries::new(&tk(), vec![(d(2024, 1, 2), 1.0), (d(2024, 1, 2), 2.0)]);
        assert!(matches!(dup, Err(Error::InvalidSeries { .. })));

        let back = PriceSeries::new(&tk(), vec![(d(2024, 1, 3), 1.0), (d(2024, 1, 2), 2.0)]);
        assert!(back.is_err());
    }

    #[test]
    fn rejects_bad_prices_and_empty() {
        assert!(PriceSeries::new(&tk(), vec![]).is_err());
        assert!(PriceSeries::new(&tk(), vec![(d(2024, 1, 2), f64::NAN)]).is_err());
        assert!(PriceSeries::new(&tk(), vec![(d(2024, 1, 2), 0.0)]).is_err());
    }

    #[test]
    fn window_is_inclusive() {
        let s = PriceSeries::new(
            &tk(),
            vec![
                (d(2024, 1, 1), 10.0),
                (d(2024, 1, 2), 11.0),
                (d(2024, 1, 3), 12.0),
                (d(2024, 1, 4), 13.0),
            ],
        )
        .unwrap();

        let w = s.window(d(2024, 1, 2), d(2024, 1, 3)).unwrap();
        assert_eq!(w.prices(), &[11.0, 12.0]);
        assert!(s.window(d(2025, 1, 1), d(2025, 2, 1)).is_none());
    }

    #[test]
    fn appending_leaves_original_untouched() {
        let s = PriceSeries::new(&tk(), vec![(d(2024, 1, 1), 10.0), (d(2024, 1, 2), 11.0)]).unwrap();
        let ext = s.with_appended(&tk(), d(2024, 1, 3), 12.1).unwrap();

        assert_eq!(s.len(), 2);
        assert_eq!(ext.len(), 3);
        assert_eq!(ext.last_price(), 12.1);
        assert!(s.with_appended(&tk(), d(2024, 1, 2), 12.0).is_err());
    }

    #[test]
    fn simple_returns_are_dated() {
        let s = PriceSeries::new(
            &tk(),
            vec![(d(2024, 1, 1), 100.0), (d(2024, 1, 2), 110.0), (d(2024, 1, 5), 99.0)],
        )
        .unwrap();
        let r = s.simple_returns();
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].0, d(2024, 1, 2));
        assert!((r[0].1 - 0.10).abs() < 1e-12);
        assert_eq!(r[1].0, d(2024, 1, 5));
        assert!((r[1].1 + 0.10).abs() < 1e-12);
    }
}
