//! Market holiday tables.
//!
//! A [`HolidayCalendar`] is a set of non-trading dates, each optionally
//! spreading its effect over a window of days before and after. The
//! forecaster only ever sees the subset of entries that falls inside the
//! fitted history (see [`HolidayCalendar::within`]).

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rustc_hash::FxHashSet;

use crate::error::{Error, Result};

/// One non-trading date.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
    /// Days before `date` that also receive the effect.
    pub lower_window: u32,
    /// Days after `date` that also receive the effect.
    pub upper_window: u32,
}

impl Holiday {
    /// A holiday affecting only its own date.
    pub fn on(date: NaiveDate, name: impl Into<String>) -> Self {
        Self {
            date,
            name: name.into(),
            lower_window: 0,
            upper_window: 0,
        }
    }
}

/// A set of holidays with unique dates, kept in date order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    holidays: Vec<Holiday>,
}

impl HolidayCalendar {
    /// An empty calendar (every weekday trades).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a list of holidays. Duplicate dates are a configuration error.
    pub fn new(mut holidays: Vec<Holiday>) -> Result<Self> {
        holidays.sort_by_key(|h| h.date);
        for pair in holidays.windows(2) {
            if pair[0].date == pair[1].date {
                return Err(Error::Config(format!(
                    "duplicate holiday date {}",
                    pair[0].date
                )));
            }
        }
        Ok(Self { holidays })
    }

    /// NSE trading holidays for 2024 and 2025.
    pub fn nse() -> Self {
        let holidays = NSE_HOLIDAYS
            .iter()
            .filter_map(|&(y, m, d, name)| {
                NaiveDate::from_ymd_opt(y, m, d).map(|date| Holiday::on(date, name))
            })
            .collect();
        Self { holidays }
    }

    /// Add holidays to this calendar, rejecting dates that are already present.
    pub fn extend(self, extra: Vec<Holiday>) -> Result<Self> {
        let mut all = self.holidays;
        all.extend(extra);
        Self::new(all)
    }

    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }

    pub fn holidays(&self) -> &[Holiday] {
        &self.holidays
    }

    /// Holidays with `start <= date <= end`.
    pub fn within(&self, start: NaiveDate, end: NaiveDate) -> Vec<&Holiday> {
        self.holidays
            .iter()
            .filter(|h| h.date >= start && h.date <= end)
            .collect()
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.binary_search_by_key(&date, |h| h.date).is_ok()
    }

    /// Weekday that is not a holiday.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }
}

/// Holiday effect columns: one `(offset, dates)` pair per window offset, in
/// offset order. All holidays share a column per offset.
pub(crate) fn effect_columns(holidays: &[&Holiday]) -> Vec<(i64, FxHashSet<NaiveDate>)> {
    let mut by_offset: BTreeMap<i64, FxHashSet<NaiveDate>> = BTreeMap::new();
    for h in holidays {
        let lo = -(i64::from(h.lower_window));
        let hi = i64::from(h.upper_window);
        for offset in lo..=hi {
            by_offset
                .entry(offset)
                .or_default()
                .insert(h.date + Duration::days(offset));
        }
    }
    by_offset.into_iter().collect()
}

const NSE_HOLIDAYS: &[(i32, u32, u32, &str)] = &[
    (2024, 1, 26, "Republic Day"),
    (2024, 3, 8, "Maha Shivaratri"),
    (2024, 3, 25, "Holi"),
    (2024, 3, 29, "Good Friday"),
    (2024, 4, 11, "Id-Ul-Fitr"),
    (2024, 4, 17, "Ram Navami"),
    (2024, 4, 21, "Mahavir Jayanti"),
    (2024, 5, 1, "Maharashtra Day"),
    (2024, 5, 23, "Buddha Purnima"),
    (2024, 6, 17, "Bakri Id"),
    (2024, 7, 17, "Muharram"),
    (2024, 8, 15, "Independence Day"),
    (2024, 8, 26, "Janmashtami"),
    (2024, 10, 2, "Gandhi Jayanti"),
    (2024, 10, 12, "Dussehra"),
    (2024, 11, 1, "Diwali Laxmi Puja"),
    (2024, 11, 2, "Diwali Balipratipada"),
    (2024, 11, 15, "Gurunanak Jayanti"),
    (2024, 12, 25, "Christmas"),
    (2025, 1, 26, "Republic Day"),
    (2025, 3, 14, "Holi"),
    (2025, 3, 31, "Id-Ul-Fitr"),
    (2025, 4, 10, "Mahavir Jayanti"),
    (2025, 4, 14, "Dr. Ambedkar Jayanti"),
    (2025, 4, 18, "Good Friday"),
    (2025, 5, 1, "Maharashtra Day"),
    (2025, 8, 15, "Independence Day"),
    (2025, 10, 2, "Gandhi Jayanti"),
    (2025, 10, 21, "Dussehra"),
    (2025, 11, 1, "Diwali Laxmi Puja"),
    (2025, 11, 5, "Gurunanak Jayanti"),
    (2025, 12, 25, "Christmas"),
];
