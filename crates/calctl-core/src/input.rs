//! Parsing of caller-supplied time expressions.
//!
//! Tool callers pass start/end times as free text. This module turns that
//! text into a [`ParsedTime`] without guessing at timezones: values that carry
//! an explicit offset stay fixed, everything else is wall-clock time in the
//! configured zone.
//!
//! ## Supported Syntax
//!
//! ### Absolute
//! - `2025-07-03T09:00:00-04:00`, `2025-07-03T13:00:00Z` (RFC 3339)
//! - `2025-07-03T09:00`, `2025-07-03 09:00`, `2025-07-03 09:00:00`
//! - `2025-07-03`, `2025/07/03`, `07/03/2025` (month first)
//! - `July 3, 2025`, `Jul 3 2025`, `3 July 2025`, `July 3rd` (current year)
//!
//! ### Relative
//! - `now`, `today`, `tomorrow`, `yesterday`, `next week`
//! - `friday`, `this friday` (next occurrence, today included)
//! - `next friday` (next occurrence after today)
//! - `in 30 minutes`, `in 2 hours`, `in 3 days`, `in 1 week`
//!
//! ### Time of day
//! Any date form may be followed by `3pm`, `3:30 pm`, `15:00`, `at 9`,
//! `noon` or `midnight`. A time of day on its own means today.

use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    Weekday,
};
use chrono_tz::Tz;
use regex::Regex;
use thiserror::Error;

static ORDINAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)\b").expect("Invalid ordinal regex"));

static RELATIVE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^in\s+(\d+)\s*(minutes?|mins?|hours?|hrs?|days?|weeks?)$")
        .expect("Invalid relative regex")
});

static TIME_OF_DAY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<rest>.*?)\s+)?(?P<at>at\s+)?(?P<h>\d{1,2})(?::(?P<m>\d{2}))?(?::(?P<s>\d{2}))?\s*(?P<mer>a\.?m\.?|p\.?m\.?)?$",
    )
    .expect("Invalid time-of-day regex")
});

static WEEKDAY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<qual>next|this|on)\s+)?(?P<day>[a-z]+)$").expect("Invalid weekday regex")
});

/// Date formats tried against the normalized (lowercased, comma-free) input.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d %Y",
    "%d %B %Y",
];

/// Formats for dates written without a year; the reference year is appended.
const YEARLESS_DATE_FORMATS: &[&str] = &["%B %d %Y", "%d %B %Y", "%m/%d %Y"];

const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M%:z"];

/// Errors produced while parsing a time expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    /// The expression was empty or whitespace.
    #[error("empty time expression")]
    Empty,
    /// The expression did not match any supported form.
    #[error("unrecognized time expression '{0}'")]
    Unrecognized(String),
    /// The expression named an hour or minute that does not exist.
    #[error("invalid time of day in '{0}'")]
    InvalidTimeOfDay(String),
    /// The expression lands outside the representable calendar range.
    #[error("time expression '{0}' is out of range")]
    OutOfRange(String),
}

/// A parsed time expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    /// A calendar date with no time of day.
    Date(NaiveDate),
    /// Wall-clock time in the configured zone.
    Floating(NaiveDateTime),
    /// An instant with an explicit UTC offset.
    Fixed(DateTime<FixedOffset>),
}

impl ParsedTime {
    /// Returns the calendar date of this value.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Date(date) => *date,
            Self::Floating(dt) => dt.date(),
            Self::Fixed(dt) => dt.date_naive(),
        }
    }

    /// Adds a duration, turning a bare date into midnight wall-clock time first.
    ///
    /// Returns `None` if the result leaves the representable range.
    pub fn checked_plus(self, duration: Duration) -> Option<Self> {
        match self {
            Self::Date(date) => date
                .and_time(NaiveTime::MIN)
                .checked_add_signed(duration)
                .map(Self::Floating),
            Self::Floating(dt) => dt.checked_add_signed(duration).map(Self::Floating),
            Self::Fixed(dt) => dt.checked_add_signed(duration).map(Self::Fixed),
        }
    }

    /// Resolves this value to an instant, reading wall-clock values in `tz`.
    ///
    /// Returns `None` for wall-clock times skipped by a DST transition.
    pub fn to_instant(&self, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            Self::Fixed(dt) => Some(dt.with_timezone(&Utc)),
            Self::Floating(dt) => tz
                .from_local_datetime(dt)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Date(date) => tz
                .from_local_datetime(&date.and_time(NaiveTime::MIN))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Parses a caller-supplied time expression relative to `reference`.
///
/// `reference` is "now" as wall-clock time in the configured zone.
pub fn parse_time_input(raw: &str, reference: NaiveDateTime) -> Result<ParsedTime, TimeParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TimeParseError::Empty);
    }

    if let Some(parsed) = parse_iso(trimmed) {
        return Ok(parsed);
    }

    let normalized = normalize(trimmed);
    let unrecognized = || TimeParseError::Unrecognized(trimmed.to_string());

    if normalized == "now" {
        return Ok(ParsedTime::Floating(reference));
    }

    if let Some(caps) = RELATIVE_REGEX.captures(&normalized) {
        let out_of_range = || TimeParseError::OutOfRange(trimmed.to_string());
        let amount: i64 = caps[1].parse().map_err(|_| out_of_range())?;
        let unit = &caps[2];
        let duration = if unit.starts_with("min") {
            Duration::try_minutes(amount)
        } else if unit.starts_with('h') {
            Duration::try_hours(amount)
        } else if unit.starts_with('d') {
            Duration::try_days(amount)
        } else {
            Duration::try_weeks(amount)
        };
        return duration
            .and_then(|d| reference.checked_add_signed(d))
            .map(ParsedTime::Floating)
            .ok_or_else(out_of_range);
    }

    let (date_part, time) = split_time_of_day(&normalized, trimmed)?;
    let date_part = date_part.trim().trim_end_matches(" at").trim();

    let date = if date_part.is_empty() {
        time.map(|_| reference.date())
    } else {
        parse_date(date_part, reference.date())
    };

    match (date, time) {
        (Some(date), Some(time)) => Ok(ParsedTime::Floating(date.and_time(time))),
        (Some(date), None) => Ok(ParsedTime::Date(date)),
        _ => Err(unrecognized()),
    }
}

/// Tries the strict ISO 8601 / RFC 3339 forms on the untouched input.
fn parse_iso(raw: &str) -> Option<ParsedTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(ParsedTime::Fixed(dt));
    }
    if let Some(dt) = OFFSET_DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(ParsedTime::Fixed(dt));
    }
    NAIVE_DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(ParsedTime::Floating)
}

/// Lowercases, drops commas and ordinal suffixes, and collapses whitespace.
fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase().replace(',', " ");
    let stripped = ORDINAL_REGEX.replace_all(&lowered, "$1");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits a trailing time of day off the expression.
///
/// A bare trailing number only counts as an hour when introduced by `at`, so
/// `july 3` stays a date.
fn split_time_of_day<'a>(
    normalized: &'a str,
    original: &str,
) -> Result<(&'a str, Option<NaiveTime>), TimeParseError> {
    for (word, hour) in [("noon", 12), ("midnight", 0)] {
        if let Some(rest) = normalized.strip_suffix(word) {
            let rest = rest.trim_end();
            let rest = rest.strip_suffix("at").unwrap_or(rest);
            return Ok((rest, NaiveTime::from_hms_opt(hour, 0, 0)));
        }
    }

    let Some(caps) = TIME_OF_DAY_REGEX.captures(normalized) else {
        return Ok((normalized, None));
    };

    let has_minutes = caps.name("m").is_some();
    let meridiem = caps.name("mer").map(|m| m.as_str().starts_with('p'));
    if !has_minutes && meridiem.is_none() && caps.name("at").is_none() {
        return Ok((normalized, None));
    }

    let invalid = || TimeParseError::InvalidTimeOfDay(original.to_string());
    let mut hour: u32 = caps["h"].parse().map_err(|_| invalid())?;
    let minute: u32 = caps.name("m").map_or(Ok(0), |m| m.as_str().parse()).map_err(|_| invalid())?;
    let second: u32 = caps.name("s").map_or(Ok(0), |s| s.as_str().parse()).map_err(|_| invalid())?;

    if let Some(is_pm) = meridiem {
        if !(1..=12).contains(&hour) {
            return Err(invalid());
        }
        hour = match (hour, is_pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
    }

    let time = NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(invalid)?;
    let rest = caps.name("rest").map_or("", |m| m.as_str());
    Ok((rest, Some(time)))
}

/// Parses the date portion of a normalized expression.
fn parse_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let raw = raw.strip_prefix("on ").unwrap_or(raw);
    match raw {
        "today" | "tonight" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        "yesterday" => return today.pred_opt(),
        "next week" => return today.checked_add_signed(Duration::weeks(1)),
        _ => {}
    }

    if let Some(date) = parse_weekday(raw, today) {
        return Some(date);
    }

    // "friday july 4 2025" names the weekday redundantly
    let raw = match raw.split_once(' ') {
        Some((first, rest)) if weekday_from_name(first).is_some() => rest,
        _ => raw,
    };

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
    {
        return Some(date);
    }

    let with_year = format!("{} {}", raw, today.year());
    YEARLESS_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&with_year, fmt).ok())
}

/// Resolves `friday`, `this friday` and `next friday`.
fn parse_weekday(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let caps = WEEKDAY_REGEX.captures(raw)?;
    let target = weekday_from_name(&caps["day"])?;
    let ahead = (7 + target.num_days_from_monday() as i64
        - today.weekday().num_days_from_monday() as i64)
        % 7;
    let ahead = match caps.name("qual").map(|q| q.as_str()) {
        Some("next") if ahead == 0 => 7,
        _ => ahead,
    };
    today.checked_add_signed(Duration::days(ahead))
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    let day = match name {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tuesday 2025-07-01 12:00.
    fn reference() -> NaiveDateTime {
        date(2025, 7, 1).and_hms_opt(12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> ParsedTime {
        ParsedTime::Floating(date(y, m, d).and_hms_opt(h, min, 0).unwrap())
    }

    fn parse(raw: &str) -> Result<ParsedTime, TimeParseError> {
        parse_time_input(raw, reference())
    }

    #[test]
    fn iso_forms() {
        assert_eq!(parse("2025-07-03 09:00").unwrap(), at(2025, 7, 3, 9, 0));
        assert_eq!(parse("2025-07-03T09:00").unwrap(), at(2025, 7, 3, 9, 0));
        assert_eq!(parse("2025-07-03T09:00:00").unwrap(), at(2025, 7, 3, 9, 0));
        assert_eq!(parse("2025-07-03").unwrap(), ParsedTime::Date(date(2025, 7, 3)));
    }

    #[test]
    fn offsets_are_kept() {
        let parsed = parse("2025-07-03T09:00:00-04:00").unwrap();
        let ParsedTime::Fixed(dt) = parsed else {
            panic!("expected fixed offset, got {parsed:?}");
        };
        assert_eq!(dt.offset().local_minus_utc(), -4 * 3600);
        assert!(matches!(parse("2025-07-03T13:00:00Z").unwrap(), ParsedTime::Fixed(_)));
    }

    #[test]
    fn written_dates() {
        assert_eq!(parse("July 3, 2025").unwrap(), ParsedTime::Date(date(2025, 7, 3)));
        assert_eq!(parse("3 July 2025").unwrap(), ParsedTime::Date(date(2025, 7, 3)));
        assert_eq!(parse("Jul 3rd").unwrap(), ParsedTime::Date(date(2025, 7, 3)));
        assert_eq!(parse("07/03/2025").unwrap(), ParsedTime::Date(date(2025, 7, 3)));
        assert_eq!(parse("2025/07/03").unwrap(), ParsedTime::Date(date(2025, 7, 3)));
    }

    #[test]
    fn written_dates_with_time() {
        assert_eq!(parse("July 3, 2025 2:30 PM").unwrap(), at(2025, 7, 3, 14, 30));
        assert_eq!(parse("2025-07-03 2pm").unwrap(), at(2025, 7, 3, 14, 0));
        assert_eq!(parse("07/03/2025 14:00").unwrap(), at(2025, 7, 3, 14, 0));
        assert_eq!(parse("July 3 at noon").unwrap(), at(2025, 7, 3, 12, 0));
    }

    #[test]
    fn keywords() {
        assert_eq!(parse("now").unwrap(), ParsedTime::Floating(reference()));
        assert_eq!(parse("today").unwrap(), ParsedTime::Date(date(2025, 7, 1)));
        assert_eq!(parse("Tomorrow").unwrap(), ParsedTime::Date(date(2025, 7, 2)));
        assert_eq!(parse("yesterday").unwrap(), ParsedTime::Date(date(2025, 6, 30)));
        assert_eq!(parse("next week").unwrap(), ParsedTime::Date(date(2025, 7, 8)));
    }

    #[test]
    fn keywords_with_time() {
        assert_eq!(parse("tomorrow at 3pm").unwrap(), at(2025, 7, 2, 15, 0));
        assert_eq!(parse("tomorrow 15:30").unwrap(), at(2025, 7, 2, 15, 30));
        assert_eq!(parse("today at 9").unwrap(), at(2025, 7, 1, 9, 0));
        assert_eq!(parse("12am").unwrap(), at(2025, 7, 1, 0, 0));
        assert_eq!(parse("12 p.m.").unwrap(), at(2025, 7, 1, 12, 0));
    }

    #[test]
    fn weekdays() {
        assert_eq!(parse("friday").unwrap(), ParsedTime::Date(date(2025, 7, 4)));
        assert_eq!(parse("this friday").unwrap(), ParsedTime::Date(date(2025, 7, 4)));
        assert_eq!(parse("tuesday").unwrap(), ParsedTime::Date(date(2025, 7, 1)));
        assert_eq!(parse("next tuesday").unwrap(), ParsedTime::Date(date(2025, 7, 8)));
        assert_eq!(parse("next fri at 10:30am").unwrap(), at(2025, 7, 4, 10, 30));
        assert_eq!(parse("Friday, July 4, 2025").unwrap(), ParsedTime::Date(date(2025, 7, 4)));
    }

    #[test]
    fn relative_offsets() {
        assert_eq!(parse("in 2 hours").unwrap(), at(2025, 7, 1, 14, 0));
        assert_eq!(parse("in 30 minutes").unwrap(), at(2025, 7, 1, 12, 30));
        assert_eq!(parse("in 3 days").unwrap(), at(2025, 7, 4, 12, 0));
        assert_eq!(parse("in 1 week").unwrap(), at(2025, 7, 8, 12, 0));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse("   "), Err(TimeParseError::Empty));
        assert_eq!(
            parse("the meeting with bob"),
            Err(TimeParseError::Unrecognized("the meeting with bob".to_string()))
        );
        assert!(matches!(parse("tomorrow 25:00"), Err(TimeParseError::InvalidTimeOfDay(_))));
        assert!(matches!(parse("13pm"), Err(TimeParseError::InvalidTimeOfDay(_))));
    }

    #[test]
    fn huge_offsets_are_out_of_range() {
        for raw in ["in 999999999 days", "in 99999999999999999 weeks", "in 99999999999999999999 minutes"] {
            assert_eq!(parse(raw), Err(TimeParseError::OutOfRange(raw.to_string())), "{raw}");
        }
    }

    #[test]
    fn checked_plus_promotes_dates() {
        let start = ParsedTime::Date(date(2025, 7, 3));
        assert_eq!(start.checked_plus(Duration::hours(1)), Some(at(2025, 7, 3, 1, 0)));
        assert_eq!(
            at(2025, 7, 3, 9, 0).checked_plus(Duration::hours(1)),
            Some(at(2025, 7, 3, 10, 0))
        );
        assert_eq!(
            ParsedTime::Floating(NaiveDateTime::MAX).checked_plus(Duration::minutes(60)),
            None
        );
    }

    #[test]
    fn instants_use_the_configured_zone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let instant = at(2025, 7, 3, 9, 0).to_instant(tz).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-07-03T13:00:00+00:00");
    }
}
