use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Months since year 0; differences give elapsed months.
    pub fn index(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    pub fn next(self) -> Self {
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

    /// Calendar quarter, 1..=4.
    pub fn quarter(self) -> u32 {
        (self.month - 1) / 3 + 1
    }

    pub fn days(self) -> u32 {
        days_in_month(self.year, self.month)
    }

    pub fn first_day(self) -> NaiveDate {
        date_or_epoch(self.year, self.month, 1)
    }

    pub fn last_day(self) -> NaiveDate {
        date_or_epoch(self.year, self.month, self.days())
    }

    /// The given day of this month, clamped to the month's length.
    pub fn clamped_day(self, day: u32) -> NaiveDate {
        date_or_epoch(self.year, self.month, day.clamp(1, self.days()))
    }

    /// Inclusive range `from..=to`; empty when `from > to`.
    pub fn range_inclusive(from: Self, to: Self) -> impl Iterator<Item = YearMonth> {
        let mut cur = from;
        std::iter::from_fn(move || {
            if cur > to {
                return None;
            }
            let out = cur;
            cur = cur.next();
            Some(out)
        })
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Length of the month: the day before the first of the following month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(30)
}

fn date_or_epoch(year: i32, month: u32, day: u32) -> NaiveDate {
    // Inputs are validated by YearMonth::new and days_in_month.
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// Day of week with Sunday = 0, matching how timetables are keyed.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

pub fn weekday_name(dow: u32) -> &'static str {
    match dow {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        _ => "Saturday",
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
