//! Calendar-day windows used for log reads.

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::Serialize;

/// An inclusive range of calendar days (UTC), normalized so `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        if from > to {
            Self { from: to, to: from }
        } else {
            Self { from, to }
        }
    }

    /// `months` calendar months either side of `date`.
    pub fn around(date: DateTime<Utc>, months: u32) -> Self {
        let day = date.date_naive();
        let from = day
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);
        let to = day
            .checked_add_months(Months::new(months))
            .unwrap_or(NaiveDate::MAX);
        Self::new(from, to)
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days()
    }

    /// Month shard keys (`YYYY-MM`) overlapping the range widened by one month on each side.
    pub fn shard_keys(&self) -> Vec<String> {
        let first = first_of_month(self.from)
            .checked_sub_months(Months::new(1))
            .unwrap_or(NaiveDate::MIN);
        let last = first_of_month(self.to)
            .checked_add_months(Months::new(1))
            .unwrap_or(NaiveDate::MAX);

        let mut keys = Vec::new();
        let mut month = first;
        while month <= last {
            keys.push(month.format("%Y-%m").to_string());
            match month.checked_add_months(Months::new(1)) {
                Some(next) => month = next,
                None => break,
            }
        }
        keys.sort();
        keys.dedup();
        keys
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Shard key (`YYYY-MM`, UTC) for an instant.
pub fn month_key(time: DateTime<Utc>) -> String {
    time.format("%Y-%m").to_string()
}

/// Midnight UTC on the first of `year-month`.
pub fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// Parse `YYYY-MM` into the first instant of that month.
pub fn parse_month(s: &str) -> Option<DateTime<Utc>> {
    let (year, month) = s.split_once('-')?;
    month_start(year.parse().ok()?, month.parse().ok()?)
}
