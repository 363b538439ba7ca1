//! Time types for calendar events.
//!
//! This module provides [`EventTime`] for representing event start/end times
//! (which may be either a wall-clock datetime or an all-day date), and
//! [`TimeWindow`] for defining query ranges.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Represents the time of a calendar event as the remote service reports it.
///
/// Calendar events can have two types of times:
/// - **DateTime**: wall-clock time in the event's own zone
/// - **AllDay**: A date without a specific time (all-day events)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// Wall-clock datetime, as written by the remote service.
    DateTime(NaiveDateTime),
    /// An all-day event date (no specific time).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Parses a wire `dateTime` value.
    ///
    /// RFC 3339 values keep the wall-clock time of their own offset; values
    /// without an offset are taken as written.
    pub fn parse_date_time(raw: &str) -> Option<Self> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self::DateTime(dt.naive_local()));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(Self::DateTime)
    }

    /// Returns `true` if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns the date portion of this event time.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.date(),
            Self::AllDay(date) => *date,
        }
    }

    /// Returns the wall-clock datetime, with all-day events at midnight.
    pub fn to_naive(&self) -> NaiveDateTime {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => date.and_time(chrono::NaiveTime::MIN),
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_naive().cmp(&other.to_naive())
    }
}

/// A time window for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window, or `None` if `start` is after `end`.
    pub fn try_new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Creates a time window from a start time and a non-negative duration.
    ///
    /// Returns `None` if the end is not representable.
    pub fn from_duration(start: DateTime<Utc>, duration: Duration) -> Option<Self> {
        let duration = duration.max(Duration::zero());
        let end = start.checked_add_signed(duration)?;
        Some(Self { start, end })
    }

    /// Creates a window from `now` covering the next `days` days.
    pub fn days_ahead(now: DateTime<Utc>, days: u32) -> Option<Self> {
        Self::from_duration(now, Duration::try_days(i64::from(days))?)
    }

    /// Returns the duration of this time window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
