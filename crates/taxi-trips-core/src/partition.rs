//! Monthly partition keys and cursor resolution.
//!
//! Every trip file covers exactly one calendar month. A [`PartitionKey`]
//! names that month, and [`PartitionKey::from_cursor`] picks the month a page
//! cursor falls into using the process's local wall clock.

use std::fmt;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use snafu::prelude::*;

/// Returned when a month outside `1..=12` is used to build a key.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(display("Invalid partition month {month} for year {year} (expected 1..=12)"))]
pub struct InvalidPartitionKey {
    /// Year that was supplied.
    pub year: i32,
    /// Month that was supplied.
    pub month: u32,
}

/// Identifies one monthly data partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    year: i32,
    month: u32,
}

impl PartitionKey {
    /// Build a key, validating that `month` is in `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self, InvalidPartitionKey> {
        ensure!((1..=12).contains(&month), InvalidPartitionKeySnafu { year, month });
        Ok(Self { year, month })
    }

    /// Resolve the partition containing `from_ms` in the local time zone.
    pub fn from_cursor(from_ms: i64) -> Self {
        Self::from_cursor_in(from_ms, &Local)
    }

    /// Resolve the partition containing `from_ms` as seen from `tz`.
    ///
    /// Millisecond values outside chrono's representable range saturate to
    /// the earliest/latest representable instant.
    pub fn from_cursor_in<Tz: TimeZone>(from_ms: i64, tz: &Tz) -> Self {
        let utc = DateTime::<Utc>::from_timestamp_millis(from_ms).unwrap_or(if from_ms < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        let local = utc.with_timezone(tz);
        Self {
            year: local.year(),
            month: local.month(),
        }
    }

    /// Calendar year.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Calendar month, `1..=12`.
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The key for the following calendar month, or `None` past `i32::MAX`.
    pub fn next(&self) -> Option<Self> {
        if self.month == 12 {
            Some(Self {
                year: self.year.checked_add(1)?,
                month: 1,
            })
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }

    /// Half-open wall-clock range `[start, end)` covered by this month.
    ///
    /// Returns `None` only for years at the edge of chrono's calendar.
    pub fn month_bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let next = self.next()?;
        let start = NaiveDate::from_ymd_opt(self.year, self.month, 1)?;
        let end = NaiveDate::from_ymd_opt(next.year, next.month, 1)?;
        Some((start.and_hms_opt(0, 0, 0)?, end.and_hms_opt(0, 0, 0)?))
    }

    /// `true` if `ts` falls inside this month.
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        ts.year() == self.year && ts.month() == self.month
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}
