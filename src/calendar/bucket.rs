use std::{fmt, str::FromStr};

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::clock::Zone;

/// Number of months covered by the monthly history window.
pub const MONTH_WINDOW: usize = 6;
/// Number of days in a week bucket.
pub const WEEK_DAYS: usize = 7;

/// Text that is not a `YYYY-MM-DD` or `YYYY-MM` key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid bucket key: {0:?}")]
pub struct BucketKeyParseError(pub String);

/// Local calendar day, rendered as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(NaiveDate);

impl DayKey {
    /// Key for a local date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Underlying date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Month this day falls in.
    pub fn month(&self) -> MonthKey {
        MonthKey::of(self.0)
    }

    /// Previous calendar day, `None` at the start of the representable range.
    pub fn pred(&self) -> Option<Self> {
        self.0.pred_opt().map(Self)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = BucketKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| BucketKeyParseError(s.to_string()))
    }
}

/// Local calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// `None` unless `month` is in `1..=12`.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Calendar year.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month number, `1..=12`.
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Previous month, crossing into December of the prior year.
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Following month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Actual calendar length of this month.
    pub fn days(&self) -> u32 {
        days_in_month(self.year, self.month)
    }

    /// True when `date` falls in this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = BucketKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || BucketKeyParseError(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(err)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(err());
        }
        let year = year.parse::<i32>().map_err(|_| err())?;
        let month = month.parse::<u32>().map_err(|_| err())?;
        Self::new(year, month).ok_or_else(err)
    }
}

/// Either kind of aggregation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketKey {
    /// A single local day.
    Day(DayKey),
    /// A local calendar month.
    Month(MonthKey),
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(day) => fmt::Display::fmt(day, f),
            Self::Month(month) => fmt::Display::fmt(month, f),
        }
    }
}

/// Gregorian leap year rule.
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Days in `month` of `year`; 0 for a month outside `1..=12`.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Local day of `ts_ms` in `zone`.
pub fn day_key(ts_ms: i64, zone: &Zone) -> DayKey {
    DayKey(zone.local_date(ts_ms))
}

/// Local month of `ts_ms` in `zone`.
pub fn month_key(ts_ms: i64, zone: &Zone) -> MonthKey {
    MonthKey::of(zone.local_date(ts_ms))
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let back = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

/// Day keys Monday..Sunday of the week containing `today`.
pub fn week_of(today: NaiveDate) -> Vec<DayKey> {
    week_start(today)
        .iter_days()
        .take(WEEK_DAYS)
        .map(DayKey)
        .collect()
}

/// The month containing `today` and the preceding months, oldest first.
pub fn month_window(today: NaiveDate) -> Vec<MonthKey> {
    let mut months = Vec::with_capacity(MONTH_WINDOW);
    let mut month = MonthKey::of(today);
    months.push(month);
    for _ in 1..MONTH_WINDOW {
        month = month.prev();
        months.push(month);
    }
    months.reverse();
    months
}

/// Instant for an entry logged "on" `target` at `now_ms`.
///
/// Keeps the local time-of-day of `now_ms` so a backfilled entry sorts among
/// that day's entries as if it were logged at the same hour. When `target`
/// is today this is `now_ms` unchanged.
pub fn backfill_timestamp(target: NaiveDate, now_ms: i64, zone: &Zone) -> i64 {
    let now_local = zone.local_datetime(now_ms);
    if now_local.date() == target {
        return now_ms;
    }
    zone.timestamp_of(target.and_time(now_local.time()))
        .unwrap_or(now_ms)
}
