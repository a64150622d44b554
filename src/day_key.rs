//! Calendar-day partitioning of samples.
//!
//! A [`DayKey`] is the `YYYY-MM-DD` calendar date of a timestamp in a given
//! [`DayZone`]. Keys order chronologically, which is also their lexicographic
//! string order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LocationHistoryError, Result};

const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Calendar-day partition identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    /// Create a key from a calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Create a key from year, month and day. Returns `None` for impossible dates.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Parse a strict `YYYY-MM-DD` key.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = || LocationHistoryError::InvalidDayKey {
            key: key.to_string(),
        };
        if key.len() != 10 {
            return Err(invalid());
        }
        NaiveDate::parse_from_str(key, DAY_KEY_FORMAT)
            .map(Self)
            .map_err(|_| invalid())
    }

    /// The calendar date this key names.
    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_KEY_FORMAT))
    }
}

impl FromStr for DayKey {
    type Err = LocationHistoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DayKey {
    type Error = LocationHistoryError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DayKey> for String {
    fn from(key: DayKey) -> Self {
        key.to_string()
    }
}

/// Time zone used to derive day keys from timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayZone {
    /// The device's local time zone (including DST transitions)
    #[default]
    Local,
    /// A fixed UTC offset
    Fixed(FixedOffset),
}

impl DayZone {
    /// UTC partitioning.
    pub fn utc() -> Self {
        DayZone::Fixed(Utc.fix())
    }

    /// Derive the day key for a millisecond timestamp.
    ///
    /// Timestamps outside chrono's representable range fall back to the Unix
    /// epoch day so a sample is never rejected for its timestamp.
    pub fn day_key(&self, timestamp_ms: i64) -> DayKey {
        let instant = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).unwrap_or_default();
        let date = match self {
            DayZone::Local => instant.with_timezone(&Local).date_naive(),
            DayZone::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        };
        DayKey(date)
    }
}

/// Date filter selecting the active view of the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFilter {
    /// Every recorded day
    #[default]
    All,
    /// A single calendar day
    Day(DayKey),
}

impl DateFilter {
    /// Whether the filter admits the given day.
    pub fn includes(&self, day: &DayKey) -> bool {
        match self {
            DateFilter::All => true,
            DateFilter::Day(selected) => selected == day,
        }
    }
}
