//! The remote event document.
//!
//! Events are kept close to the wire shape so an edit can send back the whole
//! document: fields this tool does not model (attendees, reminders,
//! recurrence, ...) ride along in `extra`.

use calctl_core::{EventSummary, EventTime, ParsedTime};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wall-clock layout used when sending floating times with a `timeZone`.
const WIRE_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A calendar event as the remote service represents it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    /// Fields not modelled here, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteEvent {
    /// Creates a new event document with a title and bounds.
    pub fn new(summary: impl Into<String>, start: EventDateTime, end: EventDateTime) -> Self {
        Self {
            summary: Some(summary.into()),
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    /// Returns the title used in confirmation messages.
    pub fn display_title(&self) -> &str {
        self.summary
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("Untitled Event")
    }

    /// Returns true if the event is keyed by date only.
    pub fn is_all_day(&self) -> bool {
        self.start.as_ref().is_some_and(EventDateTime::is_all_day)
    }

    /// Returns the fields shown in listings.
    pub fn to_summary(&self) -> EventSummary {
        EventSummary {
            title: self.summary.clone(),
            start: self.start.as_ref().and_then(EventDateTime::event_time),
            location: self.location.clone(),
            description: self.description.clone(),
        }
    }
}

/// One bound of an event: `{date}` for all-day events, `{dateTime, timeZone}` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventDateTime {
    /// A date-only bound.
    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }

    /// A timed bound carrying `tz` as its zone.
    ///
    /// Floating values are written as wall-clock text, values with an offset
    /// as RFC 3339. A bare date becomes midnight.
    pub fn timed(time: &ParsedTime, tz: Tz) -> Self {
        let date_time = match time {
            ParsedTime::Fixed(dt) => dt.to_rfc3339(),
            ParsedTime::Floating(dt) => dt.format(WIRE_LOCAL_FORMAT).to_string(),
            ParsedTime::Date(date) => date
                .and_time(NaiveTime::MIN)
                .format(WIRE_LOCAL_FORMAT)
                .to_string(),
        };
        Self {
            date: None,
            date_time: Some(date_time),
            time_zone: Some(tz.name().to_string()),
            extra: Map::new(),
        }
    }

    /// Returns true if this bound is a date without a time of day.
    pub fn is_all_day(&self) -> bool {
        self.date.is_some() && self.date_time.is_none()
    }

    /// Switches this bound to a date, keeping unknown fields.
    pub fn set_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
        self.date_time = None;
        self.time_zone = None;
    }

    /// Switches this bound to a timed value, keeping unknown fields.
    pub fn set_time(&mut self, time: &ParsedTime, tz: Tz) {
        let timed = Self::timed(time, tz);
        self.date = None;
        self.date_time = timed.date_time;
        self.time_zone = timed.time_zone;
    }

    /// Returns this bound's own zone, or `fallback` if it has none.
    pub fn zone_or(&self, fallback: Tz) -> Tz {
        self.time_zone
            .as_deref()
            .and_then(|z| z.parse::<Tz>().ok())
            .unwrap_or(fallback)
    }

    /// Returns the bound as an [`EventTime`], or `None` if unreadable.
    pub fn event_time(&self) -> Option<EventTime> {
        match (&self.date_time, self.date) {
            (Some(dt), _) => EventTime::parse_date_time(dt),
            (None, Some(date)) => Some(EventTime::AllDay(date)),
            (None, None) => None,
        }
    }

    /// Resolves the bound to an instant, reading zone-less values in its own
    /// zone or `fallback`.
    pub fn instant(&self, fallback: Tz) -> Option<DateTime<Utc>> {
        if let Some(raw) = &self.date_time
            && let Ok(dt) = DateTime::parse_from_rfc3339(raw)
        {
            return Some(dt.with_timezone(&Utc));
        }
        let local: NaiveDateTime = self.event_time()?.to_naive();
        self.zone_or(fallback)
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn new_york() -> Tz {
        chrono_tz::America::New_York
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let json = serde_json::json!({
            "id": "evt1",
            "summary": "Standup",
            "start": {"dateTime": "2025-07-03T09:00:00-04:00", "timeZone": "America/New_York"},
            "end": {"dateTime": "2025-07-03T10:00:00-04:00", "timeZone": "America/New_York"},
            "attendees": [{"email": "bob@example.com"}],
            "reminders": {"useDefault": true}
        });
        let event: RemoteEvent = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(event.extra.len(), 2);
        assert_eq!(serde_json::to_value(&event).unwrap(), json);
    }

    #[test]
    fn all_day_wire_shape() {
        let event = RemoteEvent::new(
            "Holiday",
            EventDateTime::all_day(date(2025, 7, 4)),
            EventDateTime::all_day(date(2025, 7, 5)),
        );
        assert!(event.is_all_day());
        insta::assert_json_snapshot!(event, @r#"
        {
          "summary": "Holiday",
          "start": {
            "date": "2025-07-04"
          },
          "end": {
            "date": "2025-07-05"
          }
        }
        "#);
    }

    #[test]
    fn floating_time_carries_zone() {
        let time = ParsedTime::Floating(date(2025, 7, 3).and_hms_opt(9, 0, 0).unwrap());
        let bound = EventDateTime::timed(&time, new_york());
        assert_eq!(bound.date_time.as_deref(), Some("2025-07-03T09:00:00"));
        assert_eq!(bound.time_zone.as_deref(), Some("America/New_York"));
        assert!(!bound.is_all_day());
    }

    #[test]
    fn fixed_time_keeps_offset() {
        let offset = FixedOffset::west_opt(4 * 3600).unwrap();
        let dt = offset.with_ymd_and_hms(2025, 7, 3, 9, 0, 0).unwrap();
        let bound = EventDateTime::timed(&ParsedTime::Fixed(dt), new_york());
        assert_eq!(bound.date_time.as_deref(), Some("2025-07-03T09:00:00-04:00"));
    }

    #[test]
    fn switching_representation_keeps_extra() {
        let mut bound: EventDateTime =
            serde_json::from_str(r#"{"date": "2025-07-04", "x-custom": 1}"#).unwrap();
        let time = ParsedTime::Floating(date(2025, 7, 4).and_hms_opt(8, 0, 0).unwrap());
        bound.set_time(&time, new_york());
        assert!(bound.date.is_none());
        assert_eq!(bound.extra.get("x-custom"), Some(&Value::from(1)));

        bound.set_date(date(2025, 7, 5));
        assert!(bound.is_all_day());
        assert!(bound.time_zone.is_none());
    }

    #[test]
    fn instants() {
        let fixed = EventDateTime {
            date_time: Some("2025-07-03T09:00:00-04:00".to_string()),
            ..Default::default()
        };
        assert_eq!(
            fixed.instant(chrono_tz::UTC).unwrap().to_rfc3339(),
            "2025-07-03T13:00:00+00:00"
        );

        let floating = EventDateTime {
            date_time: Some("2025-07-03T09:00:00".to_string()),
            time_zone: Some("Europe/Paris".to_string()),
            ..Default::default()
        };
        assert_eq!(
            floating.instant(new_york()).unwrap().to_rfc3339(),
            "2025-07-03T07:00:00+00:00"
        );

        let day = EventDateTime::all_day(date(2025, 7, 4));
        assert_eq!(
            day.instant(new_york()).unwrap().to_rfc3339(),
            "2025-07-04T04:00:00+00:00"
        );
    }

    #[test]
    fn summary_for_listing() {
        let event: RemoteEvent = serde_json::from_value(serde_json::json!({
            "id": "evt1",
            "start": {"date": "2025-07-04"},
            "end": {"date": "2025-07-05"},
            "location": "Park"
        }))
        .unwrap();
        let summary = event.to_summary();
        assert_eq!(summary.start, Some(EventTime::AllDay(date(2025, 7, 4))));
        assert_eq!(summary.location.as_deref(), Some("Park"));
        assert_eq!(summary.display_title(), "No title");
        assert_eq!(event.display_title(), "Untitled Event");
    }
}
