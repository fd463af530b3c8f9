//! Result records handed to persistence.

use chrono::NaiveDate;

use crate::series::Ticker;

/// One instrument's line in a [`RunRecord`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordEntry {
    pub ticker: Ticker,
    pub current_price: f64,
    pub predicted_price: f64,
    pub predicted_return: f64,
    pub weight: f64,
}

/// Outcome of one cycle as of `date`. Written once, never updated.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunRecord {
    pub date: NaiveDate,
    pub entries: Vec<RecordEntry>,
}

impl RunRecord {
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    pub fn entry(&self, ticker: &Ticker) -> Option<&RecordEntry> {
        self.entries.iter().find(|e| &e.ticker == ticker)
    }
}
