//! Text rendering for tool results.
//!
//! The calling agent reads these strings directly, so an empty result is
//! always an explicit sentence rather than an empty body.

use std::borrow::Cow;
use std::fmt::Write as _;

use chrono::NaiveDateTime;

use crate::time::EventTime;

/// Descriptions longer than this many characters are truncated in listings.
pub const DESCRIPTION_LIMIT: usize = 100;

/// Maximum number of candidates shown when a query matches several events.
pub const DISAMBIGUATION_PREVIEW: usize = 5;

const UNTITLED: &str = "No title";

/// The fields of an event that appear in a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSummary {
    /// Event title, if the event has one.
    pub title: Option<String>,
    /// Start time, if the remote document carried a readable one.
    pub start: Option<EventTime>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl EventSummary {
    /// Creates a summary with a title and start time.
    pub fn new(title: impl Into<String>, start: EventTime) -> Self {
        Self {
            title: Some(title.into()),
            start: Some(start),
            ..Default::default()
        }
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the title, or a placeholder for untitled events.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED)
    }

    fn display_start(&self) -> Cow<'static, str> {
        match &self.start {
            Some(start) => Cow::Owned(format_event_time(start)),
            None => Cow::Borrowed("unknown time"),
        }
    }
}

/// What a listing covers, used for its heading and empty message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingScope {
    /// From now over the next N days.
    DaysAhead(u32),
    /// An explicit wall-clock window.
    Window {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl ListingScope {
    fn heading(&self) -> String {
        match self {
            Self::DaysAhead(days) => format!("Upcoming events (next {days} days):"),
            Self::Window { start, end } => format!(
                "Events between {} and {}:",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            ),
        }
    }

    fn empty_message(&self) -> String {
        match self {
            Self::DaysAhead(days) => format!("No upcoming events found in the next {days} days."),
            Self::Window { start, end } => format!(
                "No events found between {} and {}.",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            ),
        }
    }
}

/// Truncates a description to [`DESCRIPTION_LIMIT`] characters.
///
/// The `...` marker is appended only when something was cut.
pub fn truncate_description(description: &str) -> Cow<'_, str> {
    if description.chars().count() <= DESCRIPTION_LIMIT {
        return Cow::Borrowed(description);
    }
    let truncated: String = description.chars().take(DESCRIPTION_LIMIT).collect();
    Cow::Owned(format!("{truncated}..."))
}

/// Formats an event start as `2025-07-03 at 09:00 AM` or `2025-07-03 (All day)`.
pub fn format_event_time(time: &EventTime) -> String {
    match time {
        EventTime::DateTime(dt) => dt.format("%Y-%m-%d at %I:%M %p").to_string(),
        EventTime::AllDay(date) => format!("{} (All day)", date.format("%Y-%m-%d")),
    }
}

/// Renders an ordered event listing.
pub fn render_listing(scope: ListingScope, events: &[EventSummary]) -> String {
    if events.is_empty() {
        return scope.empty_message();
    }

    let mut out = scope.heading();
    out.push('\n');
    for event in events {
        out.push('\n');
        let _ = writeln!(out, "* {}", event.display_title());
        let _ = writeln!(out, "  When: {}", event.display_start());
        if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
            let _ = writeln!(out, "  Where: {location}");
        }
        if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = writeln!(out, "  Notes: {}", truncate_description(description));
        }
    }
    out
}

/// Renders the candidate list returned instead of mutating on an ambiguous query.
///
/// Shows at most [`DISAMBIGUATION_PREVIEW`] entries and says how many were left out.
pub fn render_disambiguation(query: &str, candidates: &[EventSummary]) -> String {
    let mut out =
        format!("Multiple events found matching '{query}'. Please be more specific:\n\n");
    for (i, event) in candidates.iter().take(DISAMBIGUATION_PREVIEW).enumerate() {
        let _ = writeln!(
            out,
            "{}. {} ({})",
            i + 1,
            event.display_title(),
            event.display_start()
        );
    }
    let hidden = candidates.len().saturating_sub(DISAMBIGUATION_PREVIEW);
    if hidden > 0 {
        let _ = writeln!(out, "...and {hidden} more");
    }
    out
}
