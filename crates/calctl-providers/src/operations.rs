//! The four calendar intents: list, add, edit and delete.
//!
//! Edit and delete first resolve a free-text query to exactly one event. When
//! the query matches nothing or several events, nothing is mutated and the
//! outcome says so.

use std::fmt;
use std::sync::Arc;

use calctl_core::{
    EventSummary, EventTime, ListingScope, ParsedTime, TimeWindow, parse_time_input,
    render_disambiguation, render_listing,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::provider::{CalendarApi, EventQuery, SessionSource};
use crate::remote_event::{EventDateTime, RemoteEvent};
use crate::session::Session;

/// How far ahead edit and delete search for the event a query names.
pub const RESOLUTION_HORIZON_DAYS: u32 = 365;

/// Default listing window.
pub const DEFAULT_DAYS_AHEAD: u32 = 7;

/// Default cap on listed events.
pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Length in minutes of a timed event created without an end.
const DEFAULT_EVENT_MINUTES: i64 = 60;

/// Source of "now" for relative times and search windows.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Window length used when no explicit end is given.
    pub days_ahead: u32,
    /// Explicit window start (free text), defaults to now.
    pub from: Option<String>,
    /// Explicit window end (free text). A bare date includes that whole day.
    pub to: Option<String>,
    pub max_results: u32,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            days_ahead: DEFAULT_DAYS_AHEAD,
            from: None,
            to: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl ListRequest {
    /// Lists the next `days` days.
    pub fn days_ahead(days: u32) -> Self {
        Self {
            days_ahead: days,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max: u32) -> Self {
        self.max_results = max;
        self
    }
}

/// Attributes of an event to create.
///
/// Times are the caller's raw text; they are parsed when the event is built
/// so errors can name the offending argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub all_day: bool,
}

impl EventDraft {
    pub fn new(title: impl Into<String>, start_time: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            start_time: start_time.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_end_time(mut self, end_time: impl Into<String>) -> Self {
        self.end_time = Some(end_time.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }
}

/// Fields to change on an existing event. `None` leaves a field untouched.
///
/// An empty description or location clears it; an empty title is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl EventPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.description.is_none()
            && self.location.is_none()
    }
}

/// A newly inserted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEvent {
    pub id: String,
    pub title: String,
    pub start: Option<EventTime>,
}

impl fmt::Display for CreatedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event '{}' created successfully. Event ID: {}",
            self.title, self.id
        )
    }
}

/// Result of an edit or delete.
///
/// Only `Updated` and `Deleted` mean the calendar changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Updated { id: String, title: String },
    Deleted { id: String, title: String },
    /// The query matched no event.
    NotFound { query: String },
    /// The query matched several events; the caller has to narrow it.
    Ambiguous {
        query: String,
        candidates: Vec<EventSummary>,
    },
}

impl MutationOutcome {
    /// Returns true if an event was changed or removed.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Updated { .. } | Self::Deleted { .. })
    }
}

impl fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated { title, .. } => write!(f, "Event '{title}' updated successfully."),
            Self::Deleted { title, .. } => write!(f, "Event '{title}' deleted successfully."),
            Self::NotFound { query } => write!(f, "No events found matching '{query}'"),
            Self::Ambiguous { query, candidates } => {
                f.write_str(&render_disambiguation(query, candidates))
            }
        }
    }
}

enum Resolution {
    Missing,
    Unique(RemoteEvent),
    Ambiguous(Vec<RemoteEvent>),
}

/// Calendar operations over an authenticated backend.
pub struct CalendarOperations {
    sessions: Arc<dyn SessionSource>,
    api: Arc<dyn CalendarApi>,
    tz: Tz,
    clock: Clock,
}

impl CalendarOperations {
    /// Creates operations that attach `tz` to the times they create.
    pub fn new(sessions: Arc<dyn SessionSource>, api: Arc<dyn CalendarApi>, tz: Tz) -> Self {
        Self {
            sessions,
            api,
            tz,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.tz).naive_local()
    }

    fn parse(
        &self,
        argument: &str,
        raw: &str,
        reference: NaiveDateTime,
    ) -> ProviderResult<ParsedTime> {
        parse_time_input(raw, reference).map_err(|e| ProviderError::invalid_input(argument, raw, e))
    }

    fn parse_optional<'a>(
        &self,
        argument: &str,
        raw: Option<&'a str>,
        reference: NaiveDateTime,
    ) -> ProviderResult<Option<(&'a str, ParsedTime)>> {
        raw.map(|raw| self.parse(argument, raw, reference).map(|t| (raw, t)))
            .transpose()
    }

    /// Lists events and renders them for the caller.
    pub async fn list(&self, request: &ListRequest) -> ProviderResult<String> {
        if request.max_results == 0 {
            return Err(ProviderError::invalid_input(
                "max_results",
                "0",
                "must be at least 1",
            ));
        }

        let now = self.now();
        let (window, scope) = self.listing_window(request, now)?;
        let query = EventQuery::new(window).with_max_results(request.max_results);

        let session = self.sessions.session().await?;
        let events = self
            .observe(self.api.list_events(&session, &query).await)
            .await?;
        info!(count = events.len(), backend = self.api.name(), "listed events");

        let summaries: Vec<EventSummary> = events.iter().map(RemoteEvent::to_summary).collect();
        Ok(render_listing(scope, &summaries))
    }

    fn listing_window(
        &self,
        request: &ListRequest,
        now: DateTime<Utc>,
    ) -> ProviderResult<(TimeWindow, ListingScope)> {
        let too_far = || {
            ProviderError::invalid_input(
                "days_ahead",
                &request.days_ahead.to_string(),
                "window ends past the supported calendar range",
            )
        };
        if request.from.is_none() && request.to.is_none() {
            let window = TimeWindow::days_ahead(now, request.days_ahead).ok_or_else(too_far)?;
            return Ok((window, ListingScope::DaysAhead(request.days_ahead)));
        }

        let reference = self.local(now);
        let start = match request.from.as_deref() {
            Some(raw) => {
                let parsed = self.parse("from", raw, reference)?;
                self.instant("from", raw, &parsed, self.tz)?
            }
            None => now,
        };
        let end = match request.to.as_deref() {
            Some(raw) => {
                let parsed = match self.parse("to", raw, reference)? {
                    ParsedTime::Date(date) => ParsedTime::Date(next_day(date)),
                    other => other,
                };
                self.instant("to", raw, &parsed, self.tz)?
            }
            None => TimeWindow::days_ahead(start, request.days_ahead)
                .ok_or_else(too_far)?
                .end,
        };

        let window = TimeWindow::try_new(start, end).ok_or_else(|| {
            ProviderError::invalid_input(
                "to",
                request.to.as_deref().unwrap_or_default(),
                "window ends before it starts",
            )
        })?;
        let scope = ListingScope::Window {
            start: self.local(start),
            end: self.local(end),
        };
        Ok((window, scope))
    }

    /// Creates an event.
    pub async fn add(&self, draft: &EventDraft) -> ProviderResult<CreatedEvent> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(ProviderError::invalid_input(
                "title",
                &draft.title,
                "title must not be empty",
            ));
        }

        let reference = self.local(self.now());
        let start = self.parse("start_time", &draft.start_time, reference)?;
        let end = self.parse_optional("end_time", draft.end_time.as_deref(), reference)?;

        let (start_bound, end_bound) = if draft.all_day {
            all_day_bounds(start.date(), end.map(|(_, t)| t.date()))
        } else {
            self.timed_bounds(&draft.start_time, start, end)?
        };

        let mut event = RemoteEvent::new(title, start_bound, end_bound);
        event.description = non_empty(draft.description.as_deref());
        event.location = non_empty(draft.location.as_deref());

        let session = self.sessions.session().await?;
        let created = self
            .observe(self.api.insert_event(&session, &event).await)
            .await?;
        let id = created
            .id
            .clone()
            .ok_or_else(|| ProviderError::invalid_response("created event has no id"))?;
        info!(%id, all_day = draft.all_day, "created event");

        Ok(CreatedEvent {
            id,
            title: created.summary.clone().unwrap_or_else(|| title.to_string()),
            start: created.start.as_ref().and_then(EventDateTime::event_time),
        })
    }

    fn timed_bounds(
        &self,
        raw_start: &str,
        start: ParsedTime,
        end: Option<(&str, ParsedTime)>,
    ) -> ProviderResult<(EventDateTime, EventDateTime)> {
        let start_at = self.instant("start_time", raw_start, &start, self.tz)?;
        let end = match end {
            Some((raw, parsed)) => {
                let end_at = self.instant("end_time", raw, &parsed, self.tz)?;
                if end_at < start_at {
                    return Err(ProviderError::invalid_input(
                        "end_time",
                        raw,
                        "end time is before the start time",
                    ));
                }
                parsed
            }
            None => start
                .checked_plus(Duration::minutes(DEFAULT_EVENT_MINUTES))
                .ok_or_else(|| {
                    ProviderError::invalid_input(
                        "start_time",
                        raw_start,
                        "start time is too late to add a default end",
                    )
                })?,
        };
        Ok((
            EventDateTime::timed(&start, self.tz),
            EventDateTime::timed(&end, self.tz),
        ))
    }

    /// Applies `patch` to the single event matching `event_query`.
    pub async fn edit(
        &self,
        event_query: &str,
        patch: &EventPatch,
    ) -> ProviderResult<MutationOutcome> {
        let query = validate_query(event_query)?;
        if patch.is_empty() {
            return Err(ProviderError::new(
                ProviderErrorCode::InvalidInput,
                "nothing to change: pass at least one of new_title, new_start_time, \
                 new_end_time, new_description or new_location",
            ));
        }

        let reference = self.local(self.now());
        let start = self.parse_optional("new_start_time", patch.start_time.as_deref(), reference)?;
        let end = self.parse_optional("new_end_time", patch.end_time.as_deref(), reference)?;

        let session = self.sessions.session().await?;
        let target = match self.resolve(&session, query).await? {
            Resolution::Unique(event) => event,
            other => return Ok(unresolved(query, other)),
        };
        let id = event_id(&target)?;

        let mut event = self.observe(self.api.get_event(&session, &id).await).await?;
        apply_text_fields(&mut event, patch);
        if start.is_some() || end.is_some() {
            if event.is_all_day() {
                apply_dates(&mut event, start, end)?;
            } else {
                self.apply_times(&mut event, start, end)?;
            }
        }

        let updated = self
            .observe(self.api.update_event(&session, &id, &event).await)
            .await?;
        info!(%id, "updated event");
        Ok(MutationOutcome::Updated {
            title: updated
                .summary
                .clone()
                .unwrap_or_else(|| event.display_title().to_string()),
            id,
        })
    }

    /// Deletes the single event matching `event_query`.
    pub async fn delete(&self, event_query: &str) -> ProviderResult<MutationOutcome> {
        let query = validate_query(event_query)?;

        let session = self.sessions.session().await?;
        let target = match self.resolve(&session, query).await? {
            Resolution::Unique(event) => event,
            other => return Ok(unresolved(query, other)),
        };
        let id = event_id(&target)?;
        let title = target.display_title().to_string();

        self.observe(self.api.delete_event(&session, &id).await)
            .await?;
        info!(%id, "deleted event");
        Ok(MutationOutcome::Deleted { id, title })
    }

    async fn resolve(&self, session: &Session, query: &str) -> ProviderResult<Resolution> {
        let window = TimeWindow::days_ahead(self.now(), RESOLUTION_HORIZON_DAYS)
            .ok_or_else(|| ProviderError::internal("search window is out of range"))?;
        let search = EventQuery::new(window).with_text(query);
        let mut matches = self
            .observe(self.api.list_events(session, &search).await)
            .await?;
        debug!(query, matches = matches.len(), "resolved event query");

        Ok(match matches.len() {
            0 => Resolution::Missing,
            1 => Resolution::Unique(matches.remove(0)),
            _ => Resolution::Ambiguous(matches),
        })
    }

    /// Re-encodes the bounds of a timed event in its own zone.
    fn apply_times(
        &self,
        event: &mut RemoteEvent,
        start: Option<(&str, ParsedTime)>,
        end: Option<(&str, ParsedTime)>,
    ) -> ProviderResult<()> {
        let zone = event
            .start
            .as_ref()
            .map_or(self.tz, |bound| bound.zone_or(self.tz));
        let old_start = event.start.as_ref().and_then(|b| b.instant(zone));
        let old_end = event.end.as_ref().and_then(|b| b.instant(zone));

        let new_start_at = match &start {
            Some((raw, parsed)) => Some(self.instant("new_start_time", raw, parsed, zone)?),
            None => old_start,
        };

        if let Some((raw, parsed)) = &end {
            let end_at = self.instant("new_end_time", raw, parsed, zone)?;
            if let Some(start_at) = new_start_at
                && end_at < start_at
            {
                return Err(ProviderError::invalid_input(
                    "new_end_time",
                    raw,
                    "end time is before the start time",
                ));
            }
            event
                .end
                .get_or_insert_with(EventDateTime::default)
                .set_time(parsed, zone);
        } else if let Some((raw, parsed)) = &start
            && let (Some(old_start), Some(old_end), Some(new_start)) =
                (old_start, old_end, new_start_at)
            && old_end <= new_start
        {
            // keep the length when the old end would not follow the new start
            let shifted = parsed.checked_plus(old_end - old_start).ok_or_else(|| {
                ProviderError::invalid_input(
                    "new_start_time",
                    raw,
                    "moving the event there pushes its end out of range",
                )
            })?;
            event
                .end
                .get_or_insert_with(EventDateTime::default)
                .set_time(&shifted, zone);
        }

        if let Some((_, parsed)) = &start {
            event
                .start
                .get_or_insert_with(EventDateTime::default)
                .set_time(parsed, zone);
        }
        Ok(())
    }

    fn instant(
        &self,
        argument: &str,
        raw: &str,
        time: &ParsedTime,
        zone: Tz,
    ) -> ProviderResult<DateTime<Utc>> {
        time.to_instant(zone).ok_or_else(|| {
            ProviderError::invalid_input(
                argument,
                raw,
                format!("this local time does not exist in {}", zone.name()),
            )
        })
    }

    /// Invalidates the session when the API rejected its token.
    async fn observe<T>(&self, result: ProviderResult<T>) -> ProviderResult<T> {
        if let Err(err) = &result
            && err.code() == ProviderErrorCode::AuthenticationFailed
            && let Err(invalidate_err) = self.sessions.invalidate().await
        {
            warn!(error = %invalidate_err, "failed to invalidate rejected credential");
        }
        result
    }
}

impl fmt::Debug for CalendarOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarOperations")
            .field("backend", &self.api.name())
            .field("tz", &self.tz)
            .finish_non_exhaustive()
    }
}

fn validate_query(raw: &str) -> ProviderResult<&str> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(ProviderError::invalid_input(
            "event_query",
            raw,
            "query must not be empty",
        ));
    }
    Ok(query)
}

fn unresolved(query: &str, resolution: Resolution) -> MutationOutcome {
    match resolution {
        Resolution::Ambiguous(events) => MutationOutcome::Ambiguous {
            query: query.to_string(),
            candidates: events.iter().map(RemoteEvent::to_summary).collect(),
        },
        Resolution::Missing | Resolution::Unique(_) => MutationOutcome::NotFound {
            query: query.to_string(),
        },
    }
}

fn event_id(event: &RemoteEvent) -> ProviderResult<String> {
    event
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::invalid_response("matched event has no id"))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

/// Bounds of an all-day event. `last` is inclusive; the wire end is exclusive.
fn all_day_bounds(first: NaiveDate, last: Option<NaiveDate>) -> (EventDateTime, EventDateTime) {
    let last = last.unwrap_or(first).max(first);
    (
        EventDateTime::all_day(first),
        EventDateTime::all_day(next_day(last)),
    )
}

fn apply_text_fields(event: &mut RemoteEvent, patch: &EventPatch) {
    if let Some(title) = non_empty(patch.title.as_deref()) {
        event.summary = Some(title);
    }
    if let Some(description) = &patch.description {
        event.description = non_empty(Some(description));
    }
    if let Some(location) = &patch.location {
        event.location = non_empty(Some(location));
    }
}

/// Moves an all-day event, keeping it date-only.
fn apply_dates(
    event: &mut RemoteEvent,
    start: Option<(&str, ParsedTime)>,
    end: Option<(&str, ParsedTime)>,
) -> ProviderResult<()> {
    let old_start = event.start.as_ref().and_then(|b| b.date);
    let old_end = event.end.as_ref().and_then(|b| b.date);

    let first = start
        .map(|(_, t)| t.date())
        .or(old_start)
        .ok_or_else(|| ProviderError::invalid_response("all-day event has no start date"))?;

    let end_exclusive = match end {
        Some((_, t)) => next_day(t.date().max(first)),
        // keep the number of days
        None => match (old_start, old_end) {
            (Some(old_start), Some(old_end)) if old_end > old_start => first
                .checked_add_signed(old_end - old_start)
                .unwrap_or_else(|| next_day(first)),
            _ => next_day(first),
        },
    };

    event
        .start
        .get_or_insert_with(EventDateTime::default)
        .set_date(first);
    event
        .end
        .get_or_insert_with(EventDateTime::default)
        .set_date(end_exclusive);
    Ok(())
}
